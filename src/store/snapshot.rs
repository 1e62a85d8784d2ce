//! Versioned JSON snapshots of the resolution table.
//!
//! Version history:
//! - 1: catch-all verdict stored as flat `catch_all_*` columns.
//! - 2: verdict nested under `catch_all`.
//!
//! Older snapshots are migrated forward on load; newer ones are refused.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catchall::CatchallStatus;

use super::{CatchAllRecord, DomainResolution, StoreError};

pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub rows: Vec<DomainResolution>,
}

impl Snapshot {
    pub fn new(rows: Vec<DomainResolution>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            rows,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default = "first_version")]
    schema_version: u32,
    #[serde(default)]
    rows: Vec<serde_json::Value>,
}

fn first_version() -> u32 {
    1
}

#[derive(Deserialize)]
struct RowV1 {
    #[serde(flatten)]
    row: DomainResolution,
    #[serde(flatten)]
    legacy: LegacyCatchAll,
}

#[derive(Deserialize, Default)]
struct LegacyCatchAll {
    #[serde(default)]
    catch_all_status: Option<CatchallStatus>,
    #[serde(default)]
    catch_all_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    catch_all_localpart: Option<String>,
    #[serde(default)]
    catch_all_smtp_code: Option<u16>,
    #[serde(default)]
    catch_all_smtp_msg: Option<String>,
}

impl LegacyCatchAll {
    fn into_record(self) -> Option<CatchAllRecord> {
        Some(CatchAllRecord {
            status: self.catch_all_status?,
            checked_at: self.catch_all_checked_at?,
            localpart: self.catch_all_localpart,
            smtp_code: self.catch_all_smtp_code,
            smtp_msg: self.catch_all_smtp_msg,
            mx_host: None,
            error: None,
        })
    }
}

pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(snapshot).map_err(StoreError::json)
}

pub fn decode(bytes: &[u8]) -> Result<Snapshot, StoreError> {
    let envelope: Envelope = serde_json::from_slice(bytes).map_err(StoreError::json)?;
    if envelope.schema_version > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchema {
            found: envelope.schema_version,
            supported: SCHEMA_VERSION,
        });
    }

    let mut rows = Vec::with_capacity(envelope.rows.len());
    for value in envelope.rows {
        let row = if envelope.schema_version < 2 {
            migrate_v1(value)?
        } else {
            serde_json::from_value(value).map_err(StoreError::json)?
        };
        rows.push(row);
    }
    Ok(Snapshot::new(rows))
}

fn migrate_v1(value: serde_json::Value) -> Result<DomainResolution, StoreError> {
    let RowV1 { mut row, legacy } = serde_json::from_value(value).map_err(StoreError::json)?;
    if row.catch_all.is_none() {
        row.catch_all = legacy.into_record();
    }
    Ok(row)
}

pub(crate) fn write_all_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    {
        let mut f = std::fs::File::create(&tmp).map_err(StoreError::io)?;
        f.write_all(bytes).map_err(StoreError::io)?;
        f.sync_all().map_err(StoreError::io)?;
    }
    std::fs::rename(&tmp, path).map_err(StoreError::io)
}
