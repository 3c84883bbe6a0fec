use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use imap::types::Mailbox;
use native_tls::TlsConnector;

use crate::domain::{MessageId, MessageSummary};
use crate::error::{Error, Result};
use crate::mail::decoders::{decode_subject, parse_envelope_date};

pub type ImapSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;
type ImapClient = imap::Client<native_tls::TlsStream<std::net::TcpStream>>;

const DEFAULT_IMAP_PORT: u16 = 993;

/// How the recent window of a folder is bounded.
#[derive(Debug, Clone)]
pub enum RecencyPolicy {
    /// Everything whose internal date is on or after the start of "today"
    /// in the given fixed offset.
    SinceToday { tz: FixedOffset },
    /// The trailing N messages by sequence position.
    LastN(u32),
}

impl RecencyPolicy {
    /// UTC instant a summary date must reach to qualify. `None` for the
    /// by-count policy, which does not look at dates.
    pub fn since_threshold(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            RecencyPolicy::SinceToday { tz } => Some(start_of_today(*tz, now)),
            RecencyPolicy::LastN(_) => None,
        }
    }
}

/// Start of the current day in `tz`, expressed in UTC.
pub fn start_of_today(tz: FixedOffset, now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now.with_timezone(&tz).date_naive().and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).single() {
        Some(t) => t.with_timezone(&Utc),
        // unreachable for fixed offsets, which never fold or gap
        None => now,
    }
}

/// Trailing `n` sequence positions of a folder holding `exists` messages,
/// oldest first. All of them when the folder holds fewer than `n`.
pub fn last_n_ids(exists: u32, n: u32) -> Vec<MessageId> {
    if exists == 0 || n == 0 {
        return Vec::new();
    }
    let start = exists.saturating_sub(n - 1).max(1);
    (start..=exists).collect()
}

fn seq_set(ids: &[MessageId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn split_server(server: &str) -> Result<(&str, u16)> {
    // bracketed IPv6 literal, with or without a port
    if server.starts_with('[') {
        return match server.split_once(']') {
            Some((host, "")) => Ok((&host[1..], DEFAULT_IMAP_PORT)),
            Some((host, rest)) => {
                let port = rest
                    .strip_prefix(':')
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(|| Error::Config(format!("server port in {server:?}")))?;
                Ok((&host[1..], port))
            }
            None => Err(Error::Config(format!("unclosed bracket in {server:?}"))),
        };
    }
    // a second ':' means a bare IPv6 literal, not a host:port pair
    if server.bytes().filter(|b| *b == b':').count() > 1 {
        return Ok((server, DEFAULT_IMAP_PORT));
    }
    match server.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("server port in {server:?}: {e}")))?;
            Ok((host, port))
        }
        None => Ok((server, DEFAULT_IMAP_PORT)),
    }
}

fn sender_address(env: &imap_proto::types::Envelope) -> Option<String> {
    let from = env.from.as_ref()?.first()?;
    let mailbox = from.mailbox.as_deref()?;
    let host = from.host.as_deref()?;
    Some(format!(
        "{}@{}",
        String::from_utf8_lossy(mailbox),
        String::from_utf8_lossy(host)
    ))
}

/// Envelope-only reader for one remote folder.
pub struct MailFetcher {
    server: String,
    user: String,
    password: String,
}

impl MailFetcher {
    pub fn new(
        server: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// TLS dial. The returned client is not yet authenticated.
    pub fn connect(&self) -> Result<ImapClient> {
        let (host, port) = split_server(&self.server)?;
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| Error::Connection(format!("tls setup: {e}")))?;
        log::info!("connecting to {host}:{port}");
        imap::connect((host, port), host, &tls)
            .map_err(|e| Error::Connection(format!("connect {host}:{port}: {e}")))
    }

    pub fn authenticate(&self, client: ImapClient) -> Result<ImapSession> {
        client
            .login(&self.user, &self.password)
            .map_err(|(e, _client)| Error::Auth(format!("login as {}: {e}", self.user)))
    }

    pub fn select_folder(&self, session: &mut ImapSession, folder: &str) -> Result<Mailbox> {
        let mailbox = session
            .select(folder)
            .map_err(|e| Error::Folder(format!("select {folder}: {e}")))?;
        log::info!("selected {folder}: {} messages", mailbox.exists);
        Ok(mailbox)
    }

    /// Resolve the ids in the recent window, sorted oldest-to-newest.
    /// An empty folder or an empty search result is an empty vec, not an
    /// error.
    pub fn resolve_recent_ids(
        &self,
        session: &mut ImapSession,
        mailbox: &Mailbox,
        policy: &RecencyPolicy,
    ) -> Result<Vec<MessageId>> {
        if mailbox.exists == 0 {
            return Ok(Vec::new());
        }
        match policy {
            RecencyPolicy::LastN(n) => Ok(last_n_ids(mailbox.exists, *n)),
            RecencyPolicy::SinceToday { tz } => {
                let since = start_of_today(*tz, Utc::now());
                let query = format!("SINCE {}", since.format("%d-%b-%Y"));
                log::debug!("search {query}");
                let found = session
                    .search(&query)
                    .map_err(|e| Error::Fetch(format!("search {query}: {e}")))?;
                let mut ids: Vec<MessageId> = found.into_iter().collect();
                ids.sort_unstable();
                Ok(ids)
            }
        }
    }

    /// Fetch envelope metadata for `ids`. Requested ids are deduplicated;
    /// ids the server omits are skipped; an envelope without a usable
    /// "from" entry yields a summary with an absent sender.
    pub fn fetch_summaries(
        &self,
        session: &mut ImapSession,
        ids: &[MessageId],
    ) -> Result<Vec<MessageSummary>> {
        let mut ids: Vec<MessageId> = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            // no network round trip for an empty set
            return Ok(Vec::new());
        }

        let set = seq_set(&ids);
        let fetches = session
            .fetch(&set, "ENVELOPE")
            .map_err(|e| Error::Fetch(format!("fetch {}: {e}", ids.len())))?;

        let mut out: Vec<(MessageId, MessageSummary)> = Vec::with_capacity(ids.len());
        for f in fetches.iter() {
            let env = match f.envelope() {
                Some(env) => env,
                None => continue,
            };
            let subject = env
                .subject
                .as_deref()
                .map(decode_subject)
                .unwrap_or_else(|| "(no subject)".to_string());
            let sender = sender_address(env);
            let date = env.date.as_deref().and_then(parse_envelope_date);
            out.push((f.message, MessageSummary { subject, sender, date }));
        }

        // oldest-to-newest by sequence position, one summary per id
        out.sort_by_key(|(seq, _)| *seq);
        out.dedup_by_key(|(seq, _)| *seq);
        Ok(out.into_iter().map(|(_, s)| s).collect())
    }

    /// Logout. Always called on exit paths; a failed logout is not worth
    /// surfacing over the result already in hand.
    pub fn close(mut session: ImapSession) {
        if let Err(e) = session.logout() {
            log::debug!("logout: {e}");
        }
    }

    /// Connect, select, resolve and fetch in one pass, with the session
    /// closed on every path. By-date runs re-check summary dates against the
    /// precise threshold, since SEARCH SINCE is date-granular.
    pub fn fetch_recent(
        &self,
        folder: &str,
        policy: &RecencyPolicy,
    ) -> Result<Vec<MessageSummary>> {
        let client = self.connect()?;
        let mut session = self.authenticate(client)?;
        let result = self.fetch_recent_in(&mut session, folder, policy);
        Self::close(session);
        result
    }

    fn fetch_recent_in(
        &self,
        session: &mut ImapSession,
        folder: &str,
        policy: &RecencyPolicy,
    ) -> Result<Vec<MessageSummary>> {
        let mailbox = self.select_folder(session, folder)?;
        let ids = self.resolve_recent_ids(session, &mailbox, policy)?;
        log::info!("{} message(s) in window", ids.len());
        let mut summaries = self.fetch_summaries(session, &ids)?;
        if let Some(threshold) = policy.since_threshold(Utc::now()) {
            // undated summaries already matched the server's internal-date
            // search, so only a parsed date can disqualify one here
            summaries.retain(|s| s.date.is_none_or(|d| d >= threshold));
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    #[test]
    fn last_n_ids_window_smaller_than_folder() {
        assert_eq!(last_n_ids(10, 3), vec![8, 9, 10]);
    }

    #[test]
    fn last_n_ids_folder_smaller_than_window() {
        // N=5 over 3 messages: all of them, oldest first
        assert_eq!(last_n_ids(3, 5), vec![1, 2, 3]);
    }

    #[test]
    fn last_n_ids_empty_folder() {
        assert!(last_n_ids(0, 5).is_empty());
        assert!(last_n_ids(3, 0).is_empty());
    }

    #[test]
    fn start_of_today_converts_local_midnight_to_utc() {
        // 2026-08-29 01:00 at +08:00 is 2026-08-28 17:00 UTC; local "today"
        // began 2026-08-28 16:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 17, 0, 0).unwrap();
        let start = start_of_today(offset(8), now);
        assert_eq!(
            start,
            Utc.with_ymd_and_hms(2026, 8, 28, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn since_threshold_keeps_today_drops_yesterday() {
        // run at local midnight + 1 hour
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 17, 0, 0).unwrap();
        let policy = RecencyPolicy::SinceToday { tz: offset(8) };
        let threshold = policy.since_threshold(now).unwrap();

        let today = MessageSummary {
            subject: "today".into(),
            sender: Some("a@x.com".into()),
            date: Some(Utc.with_ymd_and_hms(2026, 8, 28, 16, 30, 0).unwrap()),
        };
        let yesterday = MessageSummary {
            subject: "yesterday".into(),
            sender: Some("b@x.com".into()),
            date: Some(Utc.with_ymd_and_hms(2026, 8, 28, 10, 0, 0).unwrap()),
        };
        let mut all = vec![yesterday, today.clone()];
        all.retain(|s| s.date.is_none_or(|d| d >= threshold));
        assert_eq!(all, vec![today]);
    }

    #[test]
    fn undated_summary_survives_the_precision_filter() {
        // the server's internal-date search already matched it; a missing
        // envelope date must not disqualify it afterwards
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 17, 0, 0).unwrap();
        let policy = RecencyPolicy::SinceToday { tz: offset(8) };
        let threshold = policy.since_threshold(now).unwrap();

        let undated = MessageSummary {
            subject: "no date header".into(),
            sender: Some("a@x.com".into()),
            date: None,
        };
        let mut all = vec![undated.clone()];
        all.retain(|s| s.date.is_none_or(|d| d >= threshold));
        assert_eq!(all, vec![undated]);
    }

    #[test]
    fn by_count_policy_has_no_threshold() {
        assert!(RecencyPolicy::LastN(5).since_threshold(Utc::now()).is_none());
    }

    #[test]
    fn seq_set_joins_ids() {
        assert_eq!(seq_set(&[1, 2, 7]), "1,2,7");
        assert_eq!(seq_set(&[4]), "4");
    }

    #[test]
    fn split_server_defaults_to_imaps_port() {
        assert_eq!(split_server("imap.example.com").unwrap(), ("imap.example.com", 993));
        assert_eq!(split_server("imap.example.com:143").unwrap(), ("imap.example.com", 143));
    }

    #[test]
    fn split_server_rejects_bad_port() {
        assert!(matches!(
            split_server("imap.example.com:no"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn split_server_handles_ipv6_literals() {
        assert_eq!(split_server("::1").unwrap(), ("::1", 993));
        assert_eq!(split_server("[::1]").unwrap(), ("::1", 993));
        assert_eq!(split_server("[::1]:143").unwrap(), ("::1", 143));
        assert!(matches!(split_server("[::1"), Err(Error::Config(_))));
        assert!(matches!(split_server("[::1]:no"), Err(Error::Config(_))));
    }

    #[test]
    fn search_query_uses_imap_date_format() {
        let since = Utc.with_ymd_and_hms(2026, 8, 28, 16, 0, 0).unwrap();
        assert_eq!(
            format!("SINCE {}", since.format("%d-%b-%Y")),
            "SINCE 28-Aug-2026"
        );
    }
}
