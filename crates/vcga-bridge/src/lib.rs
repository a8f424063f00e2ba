//! HTTP adapter for the local WhatsApp bridge service.
//!
//! Endpoints: `GET /chats`, `POST /send-message`, `GET /status`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use vcga_core::{
    domain::{ChatId, ChatSummary, HttpStatus},
    errors::Error,
    ports::BridgePort,
    Result,
};

const UNKNOWN_SENDER: &str = "Usuário Desconhecido";

#[derive(Clone, Debug)]
pub struct BridgeClient {
    base_url: String,
    http: reqwest::Client,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build error: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl BridgePort for BridgeClient {
    async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let resp = self
            .http
            .get(self.url("/chats"))
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "GET /chats failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let text = resp.text().await.map_err(transport)?;
        let chats = parse_chats(&text)?;
        debug!(count = chats.len(), "chats fetched");
        Ok(chats)
    }

    async fn send_message(&self, chat_id: &ChatId, message: &str) -> Result<HttpStatus> {
        let body = json!({
            "number": chat_id.number(),
            "message": message,
        });

        let resp = self
            .http
            .post(self.url("/send-message"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        Ok(HttpStatus(resp.status().as_u16()))
    }

    async fn is_connected(&self) -> Result<bool> {
        let resp = self
            .http
            .get(self.url("/status"))
            .send()
            .await
            .map_err(transport)?;
        Ok(resp.status().is_success())
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}

/// Chat entry as the bridge serializes it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChat {
    id: WireChatId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_group: Option<bool>,
    /// `-1` for chats manually marked unread; `null` on some bridge versions.
    #[serde(default)]
    unread_count: Option<i64>,
    #[serde(default)]
    last_message: Option<WireMessage>,
}

/// Either `"5521...@c.us"` or `{ "_serialized": "5521...@c.us", ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireChatId {
    Plain(String),
    Object {
        #[serde(rename = "_serialized")]
        serialized: String,
    },
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    body: Option<String>,
}

impl From<WireChat> for ChatSummary {
    fn from(w: WireChat) -> Self {
        let id = match w.id {
            WireChatId::Plain(s) => s,
            WireChatId::Object { serialized } => serialized,
        };
        let name = w
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        Self {
            id: ChatId::new(id),
            name,
            is_group: w.is_group.unwrap_or(false),
            unread_count: w
                .unread_count
                .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
                .unwrap_or(0),
            last_message: w.last_message.and_then(|m| m.body),
        }
    }
}

/// Parse the `/chats` payload. Only a non-array body fails; entries that do not
/// decode are logged and skipped so one odd chat cannot block the others.
pub fn parse_chats(text: &str) -> Result<Vec<ChatSummary>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(text)?;
    let mut chats = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<WireChat>(entry) {
            Ok(wire) => chats.push(ChatSummary::from(wire)),
            Err(e) => warn!(index, error = %e, "skipping undecodable chat entry"),
        }
    }
    Ok(chats)
}
