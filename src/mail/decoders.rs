use chrono::{DateTime, TimeZone, Utc};

/// Decode a raw envelope subject, handling RFC 2047 encoded-words. Falls
/// back to a lossy UTF-8 reading when the value will not parse as a header.
pub fn decode_subject(raw: &[u8]) -> String {
    // parse_header only accepts a complete "Name: value" line
    let mut line = Vec::with_capacity(raw.len() + 11);
    line.extend_from_slice(b"Subject: ");
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((header, _)) => header.get_value(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Parse an RFC 2822 envelope date into UTC. `None` when absent or mangled.
pub fn parse_envelope_date(raw: &[u8]) -> Option<DateTime<Utc>> {
    let s = std::str::from_utf8(raw).ok()?;
    let epoch = mailparse::dateparse(s).ok()?;
    Utc.timestamp_opt(epoch, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_subject_plain() {
        assert_eq!(decode_subject(b"bank quote request"), "bank quote request");
    }

    #[test]
    fn decode_subject_rfc2047_encoded_word() {
        // "Hello" in base64 encoded-word form
        assert_eq!(decode_subject(b"=?UTF-8?B?SGVsbG8=?="), "Hello");
    }

    #[test]
    fn parse_envelope_date_normalizes_offset_to_utc() {
        let d = parse_envelope_date(b"Sat, 29 Aug 2026 10:00:00 +0800").unwrap();
        assert_eq!(d.to_rfc3339(), "2026-08-29T02:00:00+00:00");
    }

    #[test]
    fn parse_envelope_date_rejects_garbage() {
        assert!(parse_envelope_date(b"not a date").is_none());
        assert!(parse_envelope_date(&[0xff, 0xfe]).is_none());
    }
}
