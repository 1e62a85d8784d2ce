use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::behavior::MxBehaviorStats;

use super::snapshot::{self, Snapshot};
use super::{
    CatchAllRecord, DomainResolution, ResolutionStore, ResolutionUpdate, StoreError,
    select_relevant,
};

type Key = (i64, String);

/// Mutex-guarded map of rows, owned by whoever builds the engine.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Key, DomainResolution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = DomainResolution>) -> Self {
        let map = rows
            .into_iter()
            .map(|row| ((row.company_id, row.domain.clone()), row))
            .collect();
        Self {
            rows: Mutex::new(map),
        }
    }

    /// Loads a snapshot written by [`MemoryStore::save`]. A missing file yields
    /// an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no snapshot, starting empty");
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path).map_err(StoreError::io)?;
        let snapshot = snapshot::decode(&bytes)?;
        Ok(Self::from_rows(snapshot.rows))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let snapshot = self.snapshot()?;
        let bytes = snapshot::encode(&snapshot)?;
        snapshot::write_all_atomically(path.as_ref(), &bytes)
    }

    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let rows = self.lock()?;
        let mut rows: Vec<DomainResolution> = rows.values().cloned().collect();
        rows.sort_by(|a, b| (a.company_id, &a.domain).cmp(&(b.company_id, &b.domain)));
        Ok(Snapshot::new(rows))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Key, DomainResolution>>, StoreError> {
        self.rows.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl ResolutionStore for MemoryStore {
    fn latest(
        &self,
        company_id: i64,
        domain: &str,
    ) -> Result<Option<DomainResolution>, StoreError> {
        let rows = self.lock()?;
        Ok(rows.get(&(company_id, domain.to_string())).cloned())
    }

    fn upsert_resolution(&self, update: ResolutionUpdate) -> Result<DomainResolution, StoreError> {
        let mut rows = self.lock()?;
        let key = (update.company_id, update.domain.clone());
        let row = rows.entry(key).or_insert_with(|| {
            DomainResolution::new(update.company_id, update.domain.clone(), update.resolved_at)
        });
        row.apply(&update);
        Ok(row.clone())
    }

    fn record_catch_all(
        &self,
        company_id: i64,
        domain: &str,
        record: CatchAllRecord,
    ) -> Result<bool, StoreError> {
        let mut rows = self.lock()?;
        match rows.get_mut(&(company_id, domain.to_string())) {
            Some(row) => {
                row.catch_all = Some(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn behavior_for(
        &self,
        mx_host: &str,
        domain: Option<&str>,
    ) -> Result<Option<MxBehaviorStats>, StoreError> {
        let rows = self.lock()?;
        Ok(select_relevant(rows.values(), mx_host, domain)
            .and_then(|row| row.mx_behavior.get(mx_host).cloned()))
    }

    fn merge_behavior(
        &self,
        mx_host: &str,
        domain: Option<&str>,
        merge: &mut dyn FnMut(&mut MxBehaviorStats),
    ) -> Result<bool, StoreError> {
        let mut rows = self.lock()?;
        let key = match select_relevant(rows.values(), mx_host, domain) {
            Some(row) => (row.company_id, row.domain.clone()),
            None => return Ok(false),
        };
        let Some(row) = rows.get_mut(&key) else {
            return Ok(false);
        };
        merge(row.mx_behavior.entry(mx_host.to_string()).or_default());
        Ok(true)
    }
}
