pub mod repo;
pub mod sqlite;

pub use repo::MailStore;
pub use sqlite::SqliteStore;

use std::thread;
use std::time::Duration;

use crate::error::Result;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 50;

/// Run a store operation, retrying transient write/read failures with a
/// bounded backoff before surfacing the last error.
pub fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < RETRY_ATTEMPTS => {
                log::warn!("store attempt {attempt} failed, retrying: {e}");
                thread::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
