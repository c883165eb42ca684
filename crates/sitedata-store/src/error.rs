use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteDataError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration to version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("database schema version {found} is newer than supported ({supported})")]
    FutureSchema { found: u32, supported: u32 },
    #[error("site data setup failed: {0}")]
    SetupFailed(String),
    #[error("site data setup was abandoned before completing")]
    SetupAbandoned,
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("join error: {0}")]
    Join(String),
    #[error("sqlite connection lock poisoned")]
    LockPoisoned,
}

pub type Result<T, E = SiteDataError> = std::result::Result<T, E>;

impl From<tokio::task::JoinError> for SiteDataError {
    fn from(err: tokio::task::JoinError) -> Self {
        SiteDataError::Join(err.to_string())
    }
}
