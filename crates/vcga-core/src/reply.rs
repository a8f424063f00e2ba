//! Record resolution and reply composition.
//!
//! Composition is a pure function of the resolution, the sender's display name
//! and the wall-clock time passed in; nothing here touches the network.

use chrono::{NaiveDateTime, Timelike};
use tracing::warn;

use crate::{
    classifier::Intent,
    config::Config,
    counters::Outcome,
    records::{Record, RecordCatalog},
};

const NOT_INFORMED: &str = "Não informado";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Matricula,
    Hd,
}

/// What the bot is about to answer, after any record lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Found {
        kind: IdKind,
        id: String,
        record: Record,
    },
    NotFound {
        kind: IdKind,
        id: String,
    },
    Links,
    Help,
    Unrecognized {
        text: String,
    },
}

impl Resolution {
    /// Counter bucket for this branch. Greetings share the invalid-message bucket.
    pub fn outcome(&self) -> Outcome {
        match self {
            Resolution::Found {
                kind: IdKind::Matricula,
                ..
            } => Outcome::MatriculaFound,
            Resolution::Found {
                kind: IdKind::Hd, ..
            } => Outcome::HdFound,
            Resolution::NotFound {
                kind: IdKind::Matricula,
                ..
            } => Outcome::MatriculaNotFound,
            Resolution::NotFound {
                kind: IdKind::Hd, ..
            } => Outcome::HdNotFound,
            Resolution::Links => Outcome::LinkReply,
            Resolution::Help | Resolution::Unrecognized { .. } => Outcome::InvalidMessage,
        }
    }
}

/// Resolve an intent against the catalog.
///
/// A catalog with nothing loaded answers every lookup as not-found.
pub fn resolve(intent: &Intent, raw_text: &str, catalog: &RecordCatalog) -> Resolution {
    let (kind, id) = match intent {
        Intent::QueryMatricula(id) => (IdKind::Matricula, id),
        Intent::QueryHd(id) => (IdKind::Hd, id),
        Intent::RequestLinks => return Resolution::Links,
        Intent::Greeting => return Resolution::Help,
        Intent::Unrecognized => {
            return Resolution::Unrecognized {
                text: raw_text.trim().to_string(),
            }
        }
    };

    match catalog.lookup(id) {
        Ok(Some(record)) => Resolution::Found {
            kind,
            id: id.clone(),
            record,
        },
        Ok(None) => Resolution::NotFound {
            kind,
            id: id.clone(),
        },
        Err(e) => {
            warn!(id = %id, error = %e, "lookup without records, answering as not found");
            Resolution::NotFound {
                kind,
                id: id.clone(),
            }
        }
    }
}

/// 06:00–11:59 morning, 12:00–17:59 afternoon, anything else evening.
pub fn greeting_band(now: NaiveDateTime) -> &'static str {
    match now.hour() {
        6..=11 => "BOM DIA! 🌤️",
        12..=17 => "BOA TARDE! ☀️",
        _ => "BOA NOITE! 🌜",
    }
}

#[derive(Clone, Debug)]
pub struct ReplyComposer {
    banner: String,
    links: Vec<String>,
    signature: Option<String>,
}

impl ReplyComposer {
    pub fn new(banner: impl Into<String>, links: Vec<String>, signature: Option<String>) -> Self {
        Self {
            banner: banner.into(),
            links,
            signature,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.banner.clone(), cfg.links.clone(), cfg.signature.clone())
    }

    pub fn compose(&self, resolution: &Resolution, sender_name: &str, now: NaiveDateTime) -> String {
        match resolution {
            Resolution::Found { kind, id, record } => {
                self.found(*kind, id, record, sender_name, now)
            }
            Resolution::NotFound { kind, id } => self.not_found(*kind, id, sender_name, now),
            Resolution::Links => self.links(sender_name, now),
            Resolution::Help => self.help(),
            Resolution::Unrecognized { text } => self.unrecognized(text, sender_name, now),
        }
    }

    fn header(&self, sender_name: &str, now: NaiveDateTime) -> Vec<String> {
        vec![
            self.banner.clone(),
            String::new(),
            format!("🤖 {}", greeting_band(now)),
            format!("👤 {sender_name}"),
            String::new(),
        ]
    }

    fn found(
        &self,
        kind: IdKind,
        id: &str,
        record: &Record,
        sender_name: &str,
        now: NaiveDateTime,
    ) -> String {
        let mut lines = self.header(sender_name, now);
        match kind {
            IdKind::Matricula => {
                lines.push("✅ MATRÍCULA ENCONTRADA NO SISTEMA".to_string());
                lines.push(String::new());
            }
            IdKind::Hd => {
                lines.push("✅ HD ENCONTRADO NO SISTEMA".to_string());
                lines.push(String::new());
                lines.push(format!("➡️ Informações do HD: {id}"));
            }
        }
        lines.push(field("Matrícula", &record.matricula));
        lines.push(field("Cliente", &record.client_name));
        lines.push(field("Endereço", &record.address));
        lines.push(field("Cidade", &record.city));
        lines.push(field("Bairro", &record.district));
        lines.push(field("Classificação", &record.classification));
        lines.push(String::new());
        lines.push(format!("🕐 Hora da Resposta: {}", now.format("%H:%M:%S")));
        lines.push(format!("📆 Data da Resposta: {}", now.format("%Y-%m-%d")));

        match record.map_link() {
            Some(url) => lines.push(format!("📍 Link para o Google Maps: {url}")),
            None => lines.push(match kind {
                IdKind::Matricula => "⚠️ Coordenadas não disponíveis para esta matrícula",
                IdKind::Hd => "⚠️ Coordenadas não disponíveis para este HD",
            }
            .to_string()),
        }

        lines.join("\n")
    }

    fn not_found(&self, kind: IdKind, id: &str, sender_name: &str, now: NaiveDateTime) -> String {
        let mut lines = self.header(sender_name, now);
        lines.push(match kind {
            IdKind::Matricula => format!("➡️ A matrícula: ⚠️{id}"),
            IdKind::Hd => format!("➡️ O HD: ⚠️{id}"),
        });
        lines.push("No momento não se encontra no banco de dados".to_string());
        lines.join("\n")
    }

    fn links(&self, sender_name: &str, now: NaiveDateTime) -> String {
        let mut lines = self.header(sender_name, now);
        lines.push("🔎 Segue os links para melhores atendimentos.".to_string());
        for link in &self.links {
            lines.push(String::new());
            lines.push(format!("🔗 {link}"));
        }
        self.sign(&mut lines);
        lines.join("\n")
    }

    fn help(&self) -> String {
        let mut lines = vec![
            self.banner.clone(),
            String::new(),
            "👋 Olá! Eu sou um assistente virtual projetado para ajudar você com localização e informações detalhadas sobre matrículas ou HDs digitados.".to_string(),
            String::new(),
        ];
        lines.extend(usage_lines());
        self.sign(&mut lines);
        lines.join("\n")
    }

    fn unrecognized(&self, text: &str, sender_name: &str, now: NaiveDateTime) -> String {
        let mut lines = self.header(sender_name, now);
        lines.push(format!("🚫 Você digitou: {text}"));
        lines.push(String::new());
        lines.extend(usage_lines());
        self.sign(&mut lines);
        lines.join("\n")
    }

    fn sign(&self, lines: &mut Vec<String>) {
        if let Some(sig) = &self.signature {
            lines.push(String::new());
            lines.push(format!("✍️ {sig}"));
        }
    }
}

fn usage_lines() -> [String; 3] {
    [
        "🔎 Digite os 9 números conforme a matrícula ex: 123456789".to_string(),
        String::new(),
        "🔎 Para solicitar pesquisa por HD use /. ex: /Y21C000000".to_string(),
    ]
}

fn field(label: &str, value: &Option<String>) -> String {
    let value = value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_INFORMED);
    format!("➡️ {label}: {value}")
}
