//! The poll cycle: bridge → classify → resolve → compose → deliver → count.
//!
//! Chats are processed one at a time. Per-message failures are logged and the
//! cycle moves on; a failed chat fetch only delays the next cycle.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::NaiveDateTime;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    classifier::{classify, Intent},
    config::Config,
    counters::{CounterStore, Outcome},
    delivery::DeliveryClient,
    domain::{ChatId, ChatSummary},
    errors::Error,
    ports::{BridgePort, Clock},
    records::RecordCatalog,
    reply::{resolve, ReplyComposer},
    utils::{clean_for_log, truncate_chars},
    Result,
};

const UNKNOWN_SENDER: &str = "Usuário Desconhecido";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollTiming {
    /// Pause between successful cycles.
    pub interval: Duration,
    /// Pause after the chat list could not be fetched.
    pub backoff: Duration,
    /// Upper bound for one `list_chats` call.
    pub fetch_timeout: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            backoff: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl PollTiming {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: cfg.poll_interval,
            backoff: cfg.poll_backoff,
            fetch_timeout: cfg.bridge_timeout,
        }
    }
}

/// Result of handling one unread chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedMessage {
    pub chat_id: ChatId,
    pub intent: Intent,
    pub outcome: Outcome,
    pub delivered: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub chats_seen: usize,
    pub processed: Vec<ProcessedMessage>,
    pub failures: usize,
}

/// Progress shared with the controller's `status()`.
#[derive(Debug, Default)]
pub struct LoopStats {
    cycles: AtomicU64,
    last_cycle_at: Mutex<Option<NaiveDateTime>>,
}

impl LoopStats {
    fn mark_cycle(&self, at: NaiveDateTime) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        *self.last_cycle_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    pub(crate) fn reset(&self) {
        self.cycles.store(0, Ordering::SeqCst);
        *self.last_cycle_at.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn last_cycle_at(&self) -> Option<NaiveDateTime> {
        *self.last_cycle_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct PollLoop {
    bridge: Arc<dyn BridgePort>,
    catalog: Arc<RecordCatalog>,
    composer: ReplyComposer,
    delivery: DeliveryClient,
    counters: Arc<CounterStore>,
    clock: Arc<dyn Clock>,
    timing: PollTiming,
    stats: Arc<LoopStats>,
}

impl PollLoop {
    pub fn new(
        bridge: Arc<dyn BridgePort>,
        catalog: Arc<RecordCatalog>,
        composer: ReplyComposer,
        delivery: DeliveryClient,
        counters: Arc<CounterStore>,
        clock: Arc<dyn Clock>,
        timing: PollTiming,
    ) -> Self {
        Self {
            bridge,
            catalog,
            composer,
            delivery,
            counters,
            clock,
            timing,
            stats: Arc::new(LoopStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        self.stats.clone()
    }

    pub fn counters(&self) -> Arc<CounterStore> {
        self.counters.clone()
    }

    /// Run cycles until `cancel` fires. Cancellation is honored between cycles only.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_ms = self.timing.interval.as_millis() as u64,
            "poll loop started"
        );

        while !cancel.is_cancelled() {
            self.housekeeping();

            let pause = match self.run_cycle().await {
                Ok(report) => {
                    if !report.processed.is_empty() || report.failures > 0 {
                        info!(
                            processed = report.processed.len(),
                            failures = report.failures,
                            "cycle finished"
                        );
                    }
                    self.timing.interval
                }
                Err(e) => {
                    error!(error = %e, backoff_ms = self.timing.backoff.as_millis() as u64, "could not fetch chats from bridge");
                    self.timing.backoff
                }
            };
            self.stats.mark_cycle(self.clock.now());

            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(pause) => {}
            }
        }

        info!("poll loop stopped");
    }

    /// Scheduled work at the top of every cycle: the counter rollover guard and a
    /// snapshot reload when the files changed.
    pub fn housekeeping(&self) {
        let today = self.clock.now().date();
        if let Err(e) = self.counters.roll_over(today) {
            error!(error = %e, "counter rollover could not be persisted");
        }
        match self.catalog.refresh() {
            Ok(true) => debug!("record snapshots reloaded"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "record snapshots unavailable"),
        }
    }

    /// One pass over the bridge chat list.
    ///
    /// Only the fetch can fail the cycle; per-chat errors are counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let chats = match timeout(self.timing.fetch_timeout, self.bridge.list_chats()).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(Error::Transport(format!(
                    "chat list timed out after {}ms",
                    self.timing.fetch_timeout.as_millis()
                )))
            }
        };

        let mut report = CycleReport {
            chats_seen: chats.len(),
            ..Default::default()
        };

        for chat in &chats {
            match self.process_chat(chat).await {
                Ok(Some(done)) => report.processed.push(done),
                Ok(None) => {}
                Err(e) => {
                    report.failures += 1;
                    error!(chat = %chat.id, error = %e, "failed to process message");
                }
            }
        }

        Ok(report)
    }

    /// Handle a single chat. `Ok(None)` when there is nothing to answer.
    pub async fn process_chat(&self, chat: &ChatSummary) -> Result<Option<ProcessedMessage>> {
        if chat.is_group || chat.unread_count == 0 {
            return Ok(None);
        }
        let Some(body) = chat.last_message.as_deref() else {
            return Ok(None);
        };

        let text = body.trim();
        let sender = match chat.name.trim() {
            "" => UNKNOWN_SENDER,
            name => name,
        };

        let intent = classify(text);
        info!(
            chat = %chat.id,
            sender = %clean_for_log(sender),
            text = %truncate_chars(&clean_for_log(text), 80),
            intent = intent.label(),
            "processing message"
        );

        let resolution = resolve(&intent, text, &self.catalog);
        let now = self.clock.now();
        let reply = self.composer.compose(&resolution, sender, now);

        let delivered = match self.delivery.deliver(&chat.id, &reply).await {
            Ok(_) => true,
            Err(e) => {
                warn!(chat = %chat.id, error = %e, "reply not delivered");
                false
            }
        };

        let outcome = resolution.outcome();
        self.counters.record(outcome, delivered, now.date())?;

        Ok(Some(ProcessedMessage {
            chat_id: chat.id.clone(),
            intent,
            outcome,
            delivered,
        }))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory bridge and clock shared by the poll and controller tests.

    use super::*;
    use crate::domain::HttpStatus;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    pub enum ListStep {
        Chats(Vec<ChatSummary>),
        Down,
        Hang(Duration),
        Panic,
    }

    #[derive(Default)]
    pub struct FakeBridge {
        pub list_script: Mutex<VecDeque<ListStep>>,
        pub list_calls: Mutex<Vec<Instant>>,
        pub send_status: Mutex<Option<HttpStatus>>,
        pub sent: Mutex<Vec<(ChatId, String)>>,
        pub connected: Mutex<bool>,
    }

    impl FakeBridge {
        pub fn with_chats(chats: Vec<ChatSummary>) -> Arc<Self> {
            let bridge = Self::default();
            bridge
                .list_script
                .lock()
                .unwrap()
                .push_back(ListStep::Chats(chats));
            *bridge.send_status.lock().unwrap() = Some(HttpStatus(200));
            *bridge.connected.lock().unwrap() = true;
            Arc::new(bridge)
        }

        pub fn push(&self, step: ListStep) {
            self.list_script.lock().unwrap().push_back(step);
        }

        pub fn sent(&self) -> Vec<(ChatId, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn list_calls(&self) -> Vec<Instant> {
            self.list_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BridgePort for FakeBridge {
        async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
            self.list_calls.lock().unwrap().push(Instant::now());
            let step = self.list_script.lock().unwrap().pop_front();
            match step {
                Some(ListStep::Chats(chats)) => Ok(chats),
                Some(ListStep::Down) => Err(Error::Transport("connection refused".into())),
                Some(ListStep::Hang(d)) => {
                    sleep(d).await;
                    Ok(vec![])
                }
                Some(ListStep::Panic) => panic!("bridge fake blew up"),
                None => Ok(vec![]),
            }
        }

        async fn send_message(&self, chat_id: &ChatId, message: &str) -> Result<HttpStatus> {
            let status = *self.send_status.lock().unwrap();
            match status {
                Some(s) => {
                    if s.is_success() {
                        self.sent
                            .lock()
                            .unwrap()
                            .push((chat_id.clone(), message.to_string()));
                    }
                    Ok(s)
                }
                None => Err(Error::Transport("bridge down".into())),
            }
        }

        async fn is_connected(&self) -> Result<bool> {
            Ok(*self.connected.lock().unwrap())
        }
    }

    pub struct FixedClock(pub NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    pub fn noon(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, day)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    }

    pub fn chat(id: &str, name: &str, unread: u32, body: Option<&str>) -> ChatSummary {
        ChatSummary {
            id: ChatId::new(format!("{id}@c.us")),
            name: name.to_string(),
            is_group: false,
            unread_count: unread,
            last_message: body.map(|b| b.to_string()),
        }
    }

    pub fn tmp_counters(prefix: &str) -> std::path::PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let dir = std::path::PathBuf::from(format!("/tmp/{prefix}-{}-{ts}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("contadores.json")
    }
}
