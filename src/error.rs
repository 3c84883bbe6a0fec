//! Error types for mailstate

use thiserror::Error;

/// mailstate error type
///
/// Remote-side variants come from the fetcher, local-side variants from the
/// store. Messages carry the failing stage (connect/login/select/search/
/// fetch/open/migrate/insert/query) so the CLI can report it verbatim.
#[derive(Error, Debug)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("folder error: {0}")]
    Folder(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("store open error: {0}")]
    StoreOpen(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Store I/O errors are worth a bounded retry; everything else is fatal
    /// to the current run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Write(_) | Error::Read(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
