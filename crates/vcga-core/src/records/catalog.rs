use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::SystemTime,
};

use tracing::{info, warn};

use crate::{
    errors::Error,
    records::{record::Record, store::RecordStore},
    Result,
};

/// Modification stamp of one snapshot path (`None` when the file is absent).
type FileStamp = Option<(SystemTime, u64)>;

/// Reloadable handle over the snapshot files.
///
/// The store is rebuilt only when a snapshot changes, appears or disappears, so
/// lookups always hit the in-memory index. A failed reload keeps the previous store.
pub struct RecordCatalog {
    paths: Vec<PathBuf>,
    state: RwLock<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    store: Option<Arc<RecordStore>>,
    stamps: Option<Vec<FileStamp>>,
}

impl RecordCatalog {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Catalog over an already-built store; `refresh` never replaces it.
    pub fn with_store(store: RecordStore) -> Self {
        Self {
            paths: Vec::new(),
            state: RwLock::new(CatalogState {
                store: Some(Arc::new(store)),
                stamps: Some(Vec::new()),
            }),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Reload when the snapshot files changed since the last attempt.
    ///
    /// Returns `Ok(true)` when a new store was installed.
    pub fn refresh(&self) -> Result<bool> {
        let stamps: Vec<FileStamp> = self.paths.iter().map(|p| stamp(p)).collect();

        {
            let st = self.state.read().unwrap_or_else(|e| e.into_inner());
            if st.stamps.as_ref() == Some(&stamps) {
                return Ok(false);
            }
        }

        let loaded = RecordStore::load(&self.paths);

        let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
        // Remember the stamps even on failure so an unchanged broken set is not re-parsed every cycle.
        st.stamps = Some(stamps);
        match loaded {
            Ok(store) => {
                info!(records = store.len(), "record store (re)loaded");
                st.store = Some(Arc::new(store));
                Ok(true)
            }
            Err(e) => {
                if st.store.is_some() {
                    warn!(error = %e, "snapshot reload failed, keeping previous records");
                }
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Option<Arc<RecordStore>> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .store
            .clone()
    }

    /// Look a key up in the current store; `Error::Load` when nothing was ever loaded.
    pub fn lookup(&self, key: &str) -> Result<Option<Record>> {
        let store = self
            .current()
            .ok_or_else(|| Error::Load("no record snapshot loaded".to_string()))?;
        Ok(store.lookup(key).cloned())
    }
}

fn stamp(path: &Path) -> FileStamp {
    let md = fs::metadata(path).ok()?;
    let modified = md.modified().ok()?;
    Some((modified, md.len()))
}
