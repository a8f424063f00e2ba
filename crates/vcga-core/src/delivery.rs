use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    config::{Config, ServerErrorPolicy},
    domain::ChatId,
    errors::Error,
    ports::BridgePort,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first send included.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    pub server_error: ServerErrorPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            server_error: ServerErrorPolicy::Defer,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.delivery_max_attempts.max(1),
            delay: cfg.delivery_retry_delay,
            server_error: cfg.delivery_server_error,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub attempts: u32,
}

/// Sends composed replies through the bridge with bounded retry.
///
/// Delivery is at-least-once: a send the bridge completed but we never saw
/// acknowledged can be repeated.
#[derive(Clone)]
pub struct DeliveryClient {
    bridge: Arc<dyn BridgePort>,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(bridge: Arc<dyn BridgePort>, policy: RetryPolicy) -> Self {
        Self { bridge, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// `true` when the bridge accepted the message.
    pub async fn send(&self, chat_id: &ChatId, message: &str) -> bool {
        self.deliver(chat_id, message).await.is_ok()
    }

    /// Send with the retry policy applied.
    ///
    /// - 2xx: done.
    /// - 5xx: `DeliveryDeferred`, or one consumed attempt under `ServerErrorPolicy::Retry`.
    /// - any other status: `DeliveryRejected`, no retry.
    /// - transport failure: retried until the attempt budget runs out.
    pub async fn deliver(&self, chat_id: &ChatId, message: &str) -> Result<DeliveryReceipt> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let failure = match self.bridge.send_message(chat_id, message).await {
                Ok(status) if status.is_success() => {
                    info!(chat = %chat_id, attempt, "reply delivered");
                    return Ok(DeliveryReceipt { attempts: attempt });
                }
                Ok(status) if status.is_server_error() => {
                    warn!(chat = %chat_id, %status, attempt, max, "bridge server error on send");
                    let deferred = Error::DeliveryDeferred { status: status.0 };
                    if self.policy.server_error == ServerErrorPolicy::Defer {
                        return Err(deferred);
                    }
                    deferred
                }
                Ok(status) => {
                    warn!(chat = %chat_id, %status, "bridge rejected message");
                    return Err(Error::DeliveryRejected { status: status.0 });
                }
                Err(e) if e.is_transport() => {
                    warn!(chat = %chat_id, error = %e, attempt, max, "send failed");
                    e
                }
                Err(e) => return Err(e),
            };

            if attempt >= max {
                warn!(chat = %chat_id, attempts = attempt, "giving up on delivery");
                return Err(failure);
            }
            sleep(self.policy.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatSummary, HttpStatus};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted send results; the last one repeats.
    struct ScriptedBridge {
        script: Mutex<Vec<Result<HttpStatus>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedBridge {
        fn new(script: Vec<Result<HttpStatus>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl BridgePort for ScriptedBridge {
        async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
            Ok(vec![])
        }

        async fn send_message(&self, _chat_id: &ChatId, _message: &str) -> Result<HttpStatus> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                return script.remove(0);
            }
            match &script[0] {
                Ok(s) => Ok(*s),
                Err(e) => Err(Error::Transport(e.to_string())),
            }
        }

        async fn is_connected(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn down() -> Result<HttpStatus> {
        Err(Error::Transport("connection refused".into()))
    }

    fn client(bridge: Arc<ScriptedBridge>, server_error: ServerErrorPolicy) -> DeliveryClient {
        DeliveryClient::new(
            bridge,
            RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_secs(5),
                server_error,
            },
        )
    }

    fn chat() -> ChatId {
        ChatId::new("5521999990000@c.us")
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_immediately() {
        let bridge = ScriptedBridge::new(vec![Ok(HttpStatus(200))]);
        let dc = client(bridge.clone(), ServerErrorPolicy::Defer);
        let start = Instant::now();
        assert_eq!(
            dc.deliver(&chat(), "oi").await.unwrap(),
            DeliveryReceipt { attempts: 1 }
        );
        assert_eq!(bridge.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_retry_with_fixed_delay() {
        let bridge = ScriptedBridge::new(vec![down(), down(), Ok(HttpStatus(200))]);
        let dc = client(bridge.clone(), ServerErrorPolicy::Defer);
        let start = Instant::now();
        let receipt = dc.deliver(&chat(), "oi").await.unwrap();
        assert_eq!(receipt.attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_transport_failures() {
        let bridge = ScriptedBridge::new(vec![down()]);
        let dc = client(bridge.clone(), ServerErrorPolicy::Defer);
        assert!(!dc.send(&chat(), "oi").await);
        assert_eq!(bridge.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_rejected_without_retry() {
        let bridge = ScriptedBridge::new(vec![Ok(HttpStatus(400)), Ok(HttpStatus(200))]);
        let dc = client(bridge.clone(), ServerErrorPolicy::Defer);
        let err = dc.deliver(&chat(), "oi").await.unwrap_err();
        assert!(matches!(err, Error::DeliveryRejected { status: 400 }));
        assert_eq!(bridge.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_defers_without_resending() {
        let bridge = ScriptedBridge::new(vec![Ok(HttpStatus(500)), Ok(HttpStatus(200))]);
        let dc = client(bridge.clone(), ServerErrorPolicy::Defer);
        let err = dc.deliver(&chat(), "oi").await.unwrap_err();
        assert!(matches!(err, Error::DeliveryDeferred { status: 500 }));
        assert_eq!(bridge.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_consumes_one_attempt_under_retry_policy() {
        let bridge = ScriptedBridge::new(vec![Ok(HttpStatus(500)), down(), Ok(HttpStatus(500))]);
        let dc = client(bridge.clone(), ServerErrorPolicy::Retry);
        let err = dc.deliver(&chat(), "oi").await.unwrap_err();
        assert!(matches!(err, Error::DeliveryDeferred { status: 500 }));
        assert_eq!(bridge.calls(), 3);

        let bridge = ScriptedBridge::new(vec![Ok(HttpStatus(502)), Ok(HttpStatus(200))]);
        let dc = client(bridge.clone(), ServerErrorPolicy::Retry);
        assert_eq!(dc.deliver(&chat(), "oi").await.unwrap().attempts, 2);
    }
}
