use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("snapshot I/O failed: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot encoding failed: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
}

impl StoreError {
    pub(crate) fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn json(source: serde_json::Error) -> Self {
        Self::Json { source }
    }
}
