//! Inbound text → intent. Total over its input: every string yields an [`Intent`].

/// Prefixes that get the help/explanation reply (matched case-insensitively).
pub const GREETING_PREFIXES: [&str; 13] = [
    "ola",
    "olá",
    "bom dia",
    "oi",
    "boa tarde",
    "boa noite",
    "foto",
    "foto da fachada",
    "fachada",
    "faxada",
    "pode me ajudar",
    "ajuda",
    "imagem",
];

const MATRICULA_LEN: usize = 9;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    QueryMatricula(String),
    QueryHd(String),
    RequestLinks,
    Greeting,
    Unrecognized,
}

impl Intent {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::QueryMatricula(_) => "matricula",
            Intent::QueryHd(_) => "hd",
            Intent::RequestLinks => "links",
            Intent::Greeting => "greeting",
            Intent::Unrecognized => "unrecognized",
        }
    }
}

/// Classify a message body. First matching rule wins:
/// 9 ASCII digits, `LINK` prefix, `/` prefix, greeting prefix, otherwise unrecognized.
pub fn classify(raw_text: &str) -> Intent {
    let text = raw_text.trim();

    if is_matricula(text) {
        return Intent::QueryMatricula(text.to_string());
    }

    if starts_with_ignore_case(text, "LINK") {
        return Intent::RequestLinks;
    }

    if let Some(code) = text.strip_prefix('/') {
        return Intent::QueryHd(code.trim().to_uppercase());
    }

    let lower = text.to_lowercase();
    if GREETING_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Intent::Greeting;
    }

    Intent::Unrecognized
}

pub fn is_matricula(text: &str) -> bool {
    text.len() == MATRICULA_LEN && text.bytes().all(|b| b.is_ascii_digit())
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nine_digits_is_matricula() {
        for s in ["123456789", "000000000", "999999999", " 123456789\n"] {
            assert_eq!(
                classify(s),
                Intent::QueryMatricula(s.trim().to_string()),
                "{s:?}"
            );
        }
    }

    #[test]
    fn near_matriculas_are_unrecognized() {
        for s in ["12345678", "1234567890", "12345678a", "123 456 789", "１２３４５６７８９"] {
            assert_eq!(classify(s), Intent::Unrecognized, "{s:?}");
        }
    }

    #[test]
    fn link_prefix_is_case_insensitive() {
        assert_eq!(classify("LINK qualquer coisa"), Intent::RequestLinks);
        assert_eq!(classify("link X"), Intent::RequestLinks);
        assert_eq!(classify("Links"), Intent::RequestLinks);
        assert_eq!(classify("lin"), Intent::Unrecognized);
    }

    #[test]
    fn slash_prefix_is_hd_query() {
        assert_eq!(
            classify("/Y21C000000"),
            Intent::QueryHd("Y21C000000".to_string())
        );
        assert_eq!(
            classify("/y21c000000"),
            Intent::QueryHd("Y21C000000".to_string())
        );
        assert_eq!(classify("/"), Intent::QueryHd(String::new()));
    }

    #[test]
    fn link_wins_over_greeting_and_matricula_wins_over_everything() {
        assert_eq!(classify("link oi"), Intent::RequestLinks);
        assert_eq!(classify("/link"), Intent::QueryHd("LINK".to_string()));
    }

    #[test]
    fn greetings_match_by_prefix() {
        for s in ["oi", "Oi, tudo bem?", "BOM DIA", "Olá", "ajuda por favor", "foto da fachada"] {
            assert_eq!(classify(s), Intent::Greeting, "{s:?}");
        }
    }

    #[test]
    fn anything_else_is_unrecognized() {
        for s in ["", "   ", "quero saber da conta", "12345", "?"] {
            assert_eq!(classify(s), Intent::Unrecognized, "{s:?}");
        }
    }
}
