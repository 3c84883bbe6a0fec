pub mod message;

pub use message::{MailRecord, MessageId, MessageSummary};
