use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};

use crate::{
    domain::{ChatId, ChatSummary, HttpStatus},
    Result,
};

/// Hexagonal port for the WhatsApp bridge.
///
/// This is the entire bridge contract the core relies on; session and process
/// management of the bridge live elsewhere.
#[async_trait]
pub trait BridgePort: Send + Sync {
    /// `GET /chats`. Transport failures and timeouts map to `Error::Transport`.
    async fn list_chats(&self) -> Result<Vec<ChatSummary>>;

    /// `POST /send-message`. Any HTTP answer is `Ok(status)`; only transport
    /// failures are errors.
    async fn send_message(&self, chat_id: &ChatId, message: &str) -> Result<HttpStatus>;

    /// `GET /status`. `Ok(false)` means reachable but not logged in.
    async fn is_connected(&self) -> Result<bool>;
}

/// Wall clock used for greeting bands, reply timestamps and counter rollover.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
