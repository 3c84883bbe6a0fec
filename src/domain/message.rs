use chrono::{DateTime, Utc};

/// Sequence position of a message within its selected folder.
pub type MessageId = u32;

/// Envelope-only view of one fetched message. Lives for the duration of a
/// single fetch; the durable counterpart is [`MailRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSummary {
    pub subject: String,
    /// `None` when the envelope carries no usable "from" entry.
    pub sender: Option<String>,
    /// Source time zone normalized to UTC. `None` when the envelope date is
    /// absent or unparseable; such messages are kept, not dropped.
    pub date: Option<DateTime<Utc>>,
}

/// One row of the `mail_state` table.
#[derive(Debug, Clone, PartialEq)]
pub struct MailRecord {
    /// Assigned by the store on insert; 0 until then. Immutable afterwards.
    pub id: i64,
    pub subject: String,
    pub address: String,
    pub send_time: DateTime<Utc>,
}

impl MailRecord {
    /// Map the transient fetch shape to the durable one. An absent sender
    /// becomes an empty address; an absent date becomes the epoch, since the
    /// column is not nullable.
    pub fn from_summary(summary: &MessageSummary) -> Self {
        Self {
            id: 0,
            subject: summary.subject.clone(),
            address: summary.sender.clone().unwrap_or_default(),
            send_time: summary.date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}
