//! Daily outcome counters, persisted as JSON after every mutation.
//!
//! Every mutating call first runs the rollover guard: when the date has moved past
//! `last_reset_date`, all counts go back to zero before the new event is applied.
//! Mutation and the file write happen under one lock with no await in between.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{errors::Error, Result};

/// Terminal classification outcome of one processed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    HdFound,
    HdNotFound,
    MatriculaFound,
    MatriculaNotFound,
    InvalidMessage,
    LinkReply,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterState {
    pub hd_found: u64,
    pub hd_not_found: u64,
    pub matricula_found: u64,
    pub matricula_not_found: u64,
    pub invalid_messages: u64,
    pub link_replies: u64,
    pub messages_answered: u64,
    pub last_reset_date: NaiveDate,
}

/// On-disk shape. Also reads the legacy Portuguese keys.
#[derive(Debug, Default, Deserialize)]
struct StoredCounters {
    #[serde(default, alias = "total_hd_encontrado")]
    hd_found: u64,
    #[serde(default, alias = "total_hd_nao_encontrado")]
    hd_not_found: u64,
    #[serde(default, alias = "total_matriculas_encontradas")]
    matricula_found: u64,
    #[serde(default, alias = "total_matriculas_nao_encontrada")]
    matricula_not_found: u64,
    #[serde(default, alias = "total_mensagens_invalidas")]
    invalid_messages: u64,
    #[serde(default, alias = "total_respostas_link")]
    link_replies: u64,
    #[serde(default, alias = "total_mesagens_respondidas")]
    messages_answered: u64,
    #[serde(default, alias = "ultima_data")]
    last_reset_date: Option<NaiveDate>,
}

impl CounterState {
    pub fn zeroed(today: NaiveDate) -> Self {
        Self {
            hd_found: 0,
            hd_not_found: 0,
            matricula_found: 0,
            matricula_not_found: 0,
            invalid_messages: 0,
            link_replies: 0,
            messages_answered: 0,
            last_reset_date: today,
        }
    }

    /// Transition guard: reset when `today` is past the last reset date.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if today > self.last_reset_date {
            *self = Self::zeroed(today);
            return true;
        }
        false
    }

    pub fn apply(&mut self, outcome: Outcome) {
        let slot = match outcome {
            Outcome::HdFound => &mut self.hd_found,
            Outcome::HdNotFound => &mut self.hd_not_found,
            Outcome::MatriculaFound => &mut self.matricula_found,
            Outcome::MatriculaNotFound => &mut self.matricula_not_found,
            Outcome::InvalidMessage => &mut self.invalid_messages,
            Outcome::LinkReply => &mut self.link_replies,
        };
        *slot = slot.saturating_add(1);
    }

    /// Sum of all outcome buckets (answered deliveries are not an outcome).
    pub fn total(&self) -> u64 {
        [
            self.hd_found,
            self.hd_not_found,
            self.matricula_found,
            self.matricula_not_found,
            self.invalid_messages,
            self.link_replies,
        ]
        .into_iter()
        .fold(0u64, u64::saturating_add)
    }

    fn from_stored(stored: StoredCounters, today: NaiveDate) -> Self {
        let Some(last_reset_date) = stored.last_reset_date else {
            info!("counters file has no reset date, starting from zero");
            return Self::zeroed(today);
        };
        Self {
            hd_found: stored.hd_found,
            hd_not_found: stored.hd_not_found,
            matricula_found: stored.matricula_found,
            matricula_not_found: stored.matricula_not_found,
            invalid_messages: stored.invalid_messages,
            link_replies: stored.link_replies,
            messages_answered: stored.messages_answered,
            last_reset_date,
        }
    }
}

/// Shared, file-backed counter state.
pub struct CounterStore {
    path: PathBuf,
    state: Mutex<CounterState>,
}

impl CounterStore {
    /// Load counters from `path`, falling back to zero when the file is absent or corrupt.
    pub fn open(path: impl Into<PathBuf>, today: NaiveDate) -> Self {
        let path = path.into();
        let mut state = match read_counters(&path) {
            Ok(Some(stored)) => CounterState::from_stored(stored, today),
            Ok(None) => {
                info!(path = %path.display(), "counters file not found, starting from zero");
                CounterState::zeroed(today)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "counters file unreadable, starting from zero");
                CounterState::zeroed(today)
            }
        };
        if state.roll_over(today) {
            info!("new day detected, counters reset");
        }
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one processed message: its outcome bucket, plus `messages_answered`
    /// when the reply was delivered. Persists before returning.
    ///
    /// On a write failure the in-memory counters still hold the event.
    pub fn record(&self, outcome: Outcome, answered: bool, today: NaiveDate) -> Result<CounterState> {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if st.roll_over(today) {
            info!("new day detected, counters reset");
        }
        st.apply(outcome);
        if answered {
            st.messages_answered = st.messages_answered.saturating_add(1);
        }
        let snapshot = st.clone();
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    /// Run only the rollover guard; persists when a reset happened.
    pub fn roll_over(&self, today: NaiveDate) -> Result<bool> {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !st.roll_over(today) {
            return Ok(false);
        }
        info!("new day detected, counters reset");
        let snapshot = st.clone();
        self.persist(&snapshot)?;
        Ok(true)
    }

    pub fn snapshot(&self) -> CounterState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn persist(&self, state: &CounterState) -> Result<()> {
        let txt = serde_json::to_string_pretty(state)?;
        write_atomically(&self.path, txt.as_bytes()).map_err(|source| {
            error!(path = %self.path.display(), error = %source, "failed to persist counters");
            Error::Persistence {
                path: self.path.clone(),
                source,
            }
        })
    }
}

fn read_counters(path: &Path) -> Result<Option<StoredCounters>> {
    let txt = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if txt.trim().is_empty() {
        warn!(path = %path.display(), "counters file is empty");
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&txt)?))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Read-only view of the counters for reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterReport {
    #[serde(flatten)]
    pub counters: CounterState,
    pub total: u64,
}

impl From<CounterState> for CounterReport {
    fn from(counters: CounterState) -> Self {
        let total = counters.total();
        Self { counters, total }
    }
}

impl CounterReport {
    pub fn render_text(&self) -> String {
        let c = &self.counters;
        let rows = [
            ("Matrículas encontradas", c.matricula_found),
            ("Matrículas não encontradas", c.matricula_not_found),
            ("HDs encontrados", c.hd_found),
            ("HDs não encontrados", c.hd_not_found),
            ("Mensagens inválidas", c.invalid_messages),
            ("Respostas com links", c.link_replies),
        ];
        let mut lines = vec![format!("Relatório desde {}", c.last_reset_date)];
        lines.push(String::new());
        for (label, value) in rows {
            lines.push(format!("{label:<28} {value:>8}"));
        }
        lines.push(format!("{:<28} {:>8}", "Total", self.total));
        lines.push(format!("{:<28} {:>8}", "Mensagens respondidas", c.messages_answered));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        let dir = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"));
        fs::create_dir_all(&dir).unwrap();
        dir.join("contadores.json")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[test]
    fn first_event_of_a_new_day_resets_before_applying() {
        let mut st = CounterState::zeroed(day(1));
        st.hd_found = 4;
        st.invalid_messages = 2;
        st.messages_answered = 6;

        let path = tmp("vcga-counters-roll");
        fs::write(&path, serde_json::to_string(&st).unwrap()).unwrap();

        // Opened on the same day: nothing reset.
        let store = CounterStore::open(&path, day(1));
        assert_eq!(store.snapshot().hd_found, 4);

        let after = store.record(Outcome::MatriculaFound, false, day(2)).unwrap();
        assert_eq!(after.matricula_found, 1);
        assert_eq!(after.total(), 1);
        assert_eq!(after.messages_answered, 0);
        assert_eq!(after.last_reset_date, day(2));
    }

    #[test]
    fn record_persists_every_mutation() {
        let path = tmp("vcga-counters-persist");
        let store = CounterStore::open(&path, day(3));
        store.record(Outcome::MatriculaNotFound, true, day(3)).unwrap();
        store.record(Outcome::MatriculaNotFound, false, day(3)).unwrap();

        let reopened = CounterStore::open(&path, day(3));
        let st = reopened.snapshot();
        assert_eq!(st.matricula_not_found, 2);
        assert_eq!(st.messages_answered, 1);
        assert_eq!(st.last_reset_date, day(3));
    }

    #[test]
    fn open_resets_stale_file() {
        let path = tmp("vcga-counters-stale");
        let mut st = CounterState::zeroed(day(1));
        st.link_replies = 9;
        fs::write(&path, serde_json::to_string(&st).unwrap()).unwrap();

        let store = CounterStore::open(&path, day(5));
        assert_eq!(store.snapshot(), CounterState::zeroed(day(5)));
    }

    #[test]
    fn corrupt_or_undated_file_starts_from_zero() {
        let path = tmp("vcga-counters-corrupt");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(
            CounterStore::open(&path, day(7)).snapshot(),
            CounterState::zeroed(day(7))
        );

        fs::write(&path, r#"{"hd_found": 3}"#).unwrap();
        assert_eq!(
            CounterStore::open(&path, day(7)).snapshot(),
            CounterState::zeroed(day(7))
        );
    }

    #[test]
    fn reads_legacy_counter_keys() {
        let path = tmp("vcga-counters-legacy");
        fs::write(
            &path,
            r#"{
                "total_hd_encontrado": 1,
                "total_matriculas_encontradas": 2,
                "total_hd_nao_encontrado": 3,
                "total_mensagens_invalidas": 4,
                "total_respostas_link": 5,
                "total_matriculas_nao_encontrada": 6,
                "total_mesagens_respondidas": 7,
                "ultima_data": "2026-05-09"
            }"#,
        )
        .unwrap();

        let st = CounterStore::open(&path, day(9)).snapshot();
        assert_eq!(st.hd_found, 1);
        assert_eq!(st.matricula_found, 2);
        assert_eq!(st.hd_not_found, 3);
        assert_eq!(st.invalid_messages, 4);
        assert_eq!(st.link_replies, 5);
        assert_eq!(st.matricula_not_found, 6);
        assert_eq!(st.messages_answered, 7);
        assert_eq!(st.total(), 21);
    }

    #[test]
    fn roll_over_housekeeping_persists_reset() {
        let path = tmp("vcga-counters-housekeeping");
        let store = CounterStore::open(&path, day(10));
        store.record(Outcome::LinkReply, true, day(10)).unwrap();

        assert!(!store.roll_over(day(10)).unwrap());
        assert!(store.roll_over(day(11)).unwrap());
        assert_eq!(
            CounterStore::open(&path, day(11)).snapshot(),
            CounterState::zeroed(day(11))
        );
    }

    #[test]
    fn persistence_failure_keeps_memory_authoritative() {
        let store = CounterStore::open("/nonexistent-dir/vcga/contadores.json", day(12));
        let err = store.record(Outcome::HdFound, true, day(12)).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert_eq!(store.snapshot().hd_found, 1);
        assert_eq!(store.snapshot().messages_answered, 1);
    }

    #[test]
    fn report_totals_outcomes_only() {
        let mut st = CounterState::zeroed(day(1));
        st.apply(Outcome::HdFound);
        st.apply(Outcome::LinkReply);
        st.messages_answered = 2;
        let report = CounterReport::from(st);
        assert_eq!(report.total, 2);

        let txt = report.render_text();
        assert!(txt.contains("2026-05-01"));
        assert!(txt.contains("Mensagens respondidas"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["hd_found"], 1);
        assert_eq!(json["total"], 2);
        assert_eq!(json["last_reset_date"], "2026-05-01");
    }

    #[test]
    fn total_saturates_on_huge_stored_values() {
        let mut st = CounterState::zeroed(day(1));
        st.hd_found = u64::MAX;
        st.matricula_found = 5;
        assert_eq!(st.total(), u64::MAX);
        assert_eq!(CounterReport::from(st).total, u64::MAX);
    }
}
