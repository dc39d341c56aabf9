//! Error type for `clansync-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("core error: {0}")]
    Core(#[from] clansync_core::Error),

    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    /// A stored value that no longer maps to a known variant
    #[error("decode error: {0}")]
    Decode(String),

    #[error("war {0} does not exist")]
    WarNotFound(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for clansync_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(inner) => inner,
            Error::Database(tokio_rusqlite::Error::ConnectionClosed) => {
                clansync_core::Error::storage_unavailable("database connection is closed")
            }
            Error::Json(inner) => clansync_core::Error::Json(inner),
            other => clansync_core::Error::storage(other.to_string()),
        }
    }
}
