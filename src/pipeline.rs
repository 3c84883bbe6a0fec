//! Fetch-into-store pipeline.
//!
//! One worker thread performs the remote fetch and feeds a bounded channel;
//! the caller drains it into the store. The worker's join result is the
//! completion signal and is always observed, so a fetch failure reported
//! after the last item still surfaces. An idle timeout bounds a stalled
//! remote peer instead of hanging the run forever.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::domain::{MailRecord, MessageSummary};
use crate::error::{Error, Result};
use crate::mail::{MailFetcher, RecencyPolicy};
use crate::store::{MailStore, with_retry};

const FETCH_QUEUE_DEPTH: usize = 16;

pub struct RunOptions {
    pub folder: String,
    pub policy: RecencyPolicy,
    /// Longest the consumer waits for the next summary before giving up on
    /// the worker.
    pub idle_timeout: Duration,
}

/// Fetch the recent window of `options.folder` and persist every summary.
/// Returns the stored records with their assigned ids, oldest first.
pub fn run(
    fetcher: MailFetcher,
    store: &dyn MailStore,
    options: &RunOptions,
) -> Result<Vec<MailRecord>> {
    let folder = options.folder.clone();
    let policy = options.policy.clone();
    run_with(
        move |tx| {
            let summaries = fetcher.fetch_recent(&folder, &policy)?;
            for s in summaries {
                // consumer gone: stop producing, its error wins
                if tx.send(s).is_err() {
                    break;
                }
            }
            Ok(())
        },
        store,
        options.idle_timeout,
    )
}

fn run_with(
    produce: impl FnOnce(&mpsc::SyncSender<MessageSummary>) -> Result<()> + Send + 'static,
    store: &dyn MailStore,
    idle_timeout: Duration,
) -> Result<Vec<MailRecord>> {
    let (tx, rx) = mpsc::sync_channel::<MessageSummary>(FETCH_QUEUE_DEPTH);

    let worker = thread::spawn(move || produce(&tx));

    let drained = drain(&rx, store, idle_timeout);
    // unblock a producer still waiting on a full queue
    drop(rx);
    // On a consumer-side error the worker is left to wind down on its own;
    // joining a peer that already stalled past the idle timeout would
    // reintroduce the unbounded hang.
    let drained = drained?;

    match worker.join() {
        Ok(completion) => completion?,
        Err(_) => return Err(Error::Fetch("fetch worker panicked".into())),
    }
    Ok(drained)
}

fn drain(
    rx: &mpsc::Receiver<MessageSummary>,
    store: &dyn MailStore,
    idle_timeout: Duration,
) -> Result<Vec<MailRecord>> {
    let mut stored = Vec::new();
    loop {
        match rx.recv_timeout(idle_timeout) {
            Ok(summary) => {
                let record = MailRecord::from_summary(&summary);
                stored.push(with_retry(|| store.insert(&record))?);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(Error::Fetch(format!(
                    "no progress from fetch worker within {}s",
                    idle_timeout.as_secs()
                )));
            }
        }
    }
    log::info!("stored {} record(s)", stored.len());
    Ok(stored)
}
