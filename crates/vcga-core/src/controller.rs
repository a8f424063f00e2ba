//! Start/stop/status around a single background poll worker.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::{task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    counters::{CounterReport, CounterStore},
    delivery::{DeliveryClient, RetryPolicy},
    errors::Error,
    poll::{LoopStats, PollLoop, PollTiming},
    ports::{BridgePort, Clock},
    records::RecordCatalog,
    reply::ReplyComposer,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
    /// The worker was signalled but is still finishing its current cycle.
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BotStatus {
    pub running: bool,
    pub cycles: u64,
    pub last_cycle_at: Option<NaiveDateTime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerOptions {
    pub require_bridge_connected: bool,
    pub connect_timeout: Duration,
    pub stop_join_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            require_bridge_connected: true,
            connect_timeout: Duration::from_secs(10),
            stop_join_timeout: Duration::from_secs(5),
        }
    }
}

impl ControllerOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            require_bridge_connected: cfg.require_bridge_connected,
            connect_timeout: cfg.bridge_timeout,
            stop_join_timeout: cfg.stop_join_timeout,
        }
    }
}

/// Owns the poll worker. At most one worker runs per controller.
#[derive(Clone)]
pub struct BotController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    poll: Arc<PollLoop>,
    bridge: Arc<dyn BridgePort>,
    stats: Arc<LoopStats>,
    counters: Arc<CounterStore>,
    opts: ControllerOptions,
    state: tokio::sync::Mutex<ControllerState>,
}

#[derive(Default)]
struct ControllerState {
    running: bool,
    cancel: Option<CancellationToken>,
    /// Kept after a timed-out stop so a later start waits for the old worker.
    handle: Option<JoinHandle<()>>,
}

impl BotController {
    pub fn new(poll: PollLoop, bridge: Arc<dyn BridgePort>, opts: ControllerOptions) -> Self {
        let stats = poll.stats();
        let counters = poll.counters();
        Self {
            inner: Arc::new(ControllerInner {
                poll: Arc::new(poll),
                bridge,
                stats,
                counters,
                opts,
                state: tokio::sync::Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Wire the full pipeline from configuration.
    ///
    /// Snapshot load failures are logged; lookups answer not-found until a later
    /// refresh finds readable files.
    pub fn from_config(cfg: &Config, bridge: Arc<dyn BridgePort>, clock: Arc<dyn Clock>) -> Self {
        let catalog = Arc::new(RecordCatalog::new(cfg.snapshot_files.clone()));
        if let Err(e) = catalog.refresh() {
            warn!(error = %e, "no record snapshots loaded at startup");
        }
        let counters = Arc::new(CounterStore::open(
            cfg.counters_file.clone(),
            clock.now().date(),
        ));
        let delivery = DeliveryClient::new(bridge.clone(), RetryPolicy::from_config(cfg));
        let poll = PollLoop::new(
            bridge.clone(),
            catalog,
            ReplyComposer::from_config(cfg),
            delivery,
            counters,
            clock,
            PollTiming::from_config(cfg),
        );
        Self::new(poll, bridge, ControllerOptions::from_config(cfg))
    }

    pub async fn start(&self) -> Result<StartOutcome> {
        let mut st = self.inner.state.lock().await;
        if st.running {
            let alive = st.handle.as_ref().is_some_and(|h| !h.is_finished());
            if alive {
                return Ok(StartOutcome::AlreadyRunning);
            }
            warn!("poll worker exited on its own, restarting");
            st.running = false;
            st.cancel = None;
        }

        if let Some(prev) = st.handle.take() {
            if !prev.is_finished() {
                info!("waiting for previous worker to finish its cycle");
                if let Err(e) = prev.await {
                    error!(error = %e, "previous worker ended abnormally");
                }
            }
        }

        if self.inner.opts.require_bridge_connected {
            self.check_bridge().await?;
        }

        self.inner.stats.reset();
        let cancel = CancellationToken::new();
        let poll = self.inner.poll.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            poll.run(token).await;
        });

        st.running = true;
        st.cancel = Some(cancel);
        st.handle = Some(handle);
        info!("bot started");
        Ok(StartOutcome::Started)
    }

    /// Signal the worker and wait (bounded) for it to finish.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut st = self.inner.state.lock().await;
        if !st.running {
            return Ok(StopOutcome::NotRunning);
        }
        st.running = false;
        if let Some(tok) = st.cancel.take() {
            tok.cancel();
        }

        let Some(mut handle) = st.handle.take() else {
            return Ok(StopOutcome::Stopped);
        };

        match timeout(self.inner.opts.stop_join_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("bot stopped");
                Ok(StopOutcome::Stopped)
            }
            Ok(Err(e)) => {
                error!(error = %e, "poll worker ended abnormally");
                Ok(StopOutcome::Stopped)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.inner.opts.stop_join_timeout.as_millis() as u64,
                    "poll worker still finishing its cycle"
                );
                st.handle = Some(handle);
                Ok(StopOutcome::TimedOut)
            }
        }
    }

    pub async fn status(&self) -> BotStatus {
        let st = self.inner.state.lock().await;
        let alive = st.handle.as_ref().is_some_and(|h| !h.is_finished());
        BotStatus {
            running: st.running && alive,
            cycles: self.inner.stats.cycles(),
            last_cycle_at: self.inner.stats.last_cycle_at(),
        }
    }

    pub fn report(&self) -> CounterReport {
        CounterReport::from(self.inner.counters.snapshot())
    }

    async fn check_bridge(&self) -> Result<()> {
        let probe = timeout(self.inner.opts.connect_timeout, self.inner.bridge.is_connected());
        match probe.await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(Error::BridgeUnavailable(
                "WhatsApp client is not connected".into(),
            )),
            Ok(Err(e)) => Err(Error::BridgeUnavailable(e.to_string())),
            Err(_) => Err(Error::BridgeUnavailable(
                "bridge status check timed out".into(),
            )),
        }
    }
}
