pub mod decoders;
pub mod fetcher;

pub use fetcher::{MailFetcher, RecencyPolicy};
