use crate::domain::MailRecord;
use crate::error::Result;

/// Seam over the embedded store so the pipeline and tests can take a
/// `&dyn MailStore`.
pub trait MailStore: Send {
    /// Persist one record; the returned copy carries the assigned id.
    fn insert(&self, record: &MailRecord) -> Result<MailRecord>;

    /// All rows, ordered by id.
    fn find_all(&self) -> Result<Vec<MailRecord>>;
}
