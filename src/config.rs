use std::fs;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mail::RecencyPolicy;

/// Resolved runtime configuration. Built once by [`load_config`] and passed
/// explicitly to each component; nothing reads the environment after load.
#[derive(Debug, Clone)]
pub struct Config {
    /// IMAP host or host:port (993 when omitted).
    pub server: String,
    pub username: String,
    /// Already decoded from its Base64 at-rest form.
    pub password: String,
    pub folder: String,
    /// Fixed UTC offset used to decide where "today" starts, e.g. "+08:00".
    pub timezone: String,
    pub db_path: Option<String>,
    /// By-count window; by-date ("since today") when unset.
    pub last: Option<u32>,
}

/// On-disk shape. Every field optional so a partial file plus environment
/// overrides can still form a complete [`Config`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct FileConfig {
    server: Option<String>,
    username: Option<String>,
    /// Base64-encoded at rest.
    password: Option<String>,
    folder: Option<String>,
    timezone: Option<String>,
    db_path: Option<String>,
    last: Option<u32>,
}

const DEFAULT_FOLDER: &str = "INBOX";
const DEFAULT_TIMEZONE: &str = "+08:00";

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| Error::Config("no config dir available".into()))?
        .join("mailstate"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p).map_err(|e| Error::Config(format!("create {}: {e}", p.display())))?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p).map_err(|e| Error::Config(format!("create {}: {e}", p.display())))?;
    p.push("mail.db");
    Ok(p)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let s = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
    toml::from_str(&s).map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))
}

fn write_template(path: &Path) -> Result<()> {
    let sample = FileConfig {
        server: Some("imap.example.com:993".to_string()),
        username: Some("you@example.com".to_string()),
        password: Some("BASE64_OF_YOUR_PASSWORD".to_string()),
        folder: Some(DEFAULT_FOLDER.to_string()),
        timezone: Some(DEFAULT_TIMEZONE.to_string()),
        db_path: None,
        last: None,
    };
    let tom =
        toml::to_string_pretty(&sample).map_err(|e| Error::Config(format!("serialize: {e}")))?;
    fs::write(path, tom).map_err(|e| Error::Config(format!("write {}: {e}", path.display())))?;
    Ok(())
}

/// Decode the at-rest Base64 form of the password.
pub fn decode_password(encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Config(format!("password base64 decode: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Config(format!("password not utf-8: {e}")))
}

/// Load the settings file (explicit path or the default location), apply
/// MAILSTATE_* environment overrides, and decode the credential.
///
/// When neither the file nor the environment supplies the required fields and
/// no file existed, a template is written for the user to edit.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    let existed = path.exists();
    let mut file = read_file_config(&path)?;

    if let Some(v) = env_var("MAILSTATE_SERVER") {
        file.server = Some(v);
    }
    if let Some(v) = env_var("MAILSTATE_USERNAME") {
        file.username = Some(v);
    }
    if let Some(v) = env_var("MAILSTATE_PASSWORD") {
        file.password = Some(v);
    }
    if let Some(v) = env_var("MAILSTATE_FOLDER") {
        file.folder = Some(v);
    }
    if let Some(v) = env_var("MAILSTATE_TIMEZONE") {
        file.timezone = Some(v);
    }
    if let Some(v) = env_var("MAILSTATE_DB_PATH") {
        file.db_path = Some(v);
    }
    if let Some(v) = env_var("MAILSTATE_LAST") {
        let n = v
            .parse::<u32>()
            .map_err(|e| Error::Config(format!("MAILSTATE_LAST: {e}")))?;
        file.last = Some(n);
    }

    let missing: Vec<&str> = [
        ("server", file.server.is_none()),
        ("username", file.username.is_none()),
        ("password", file.password.is_none()),
    ]
    .iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| *name)
    .collect();

    if !missing.is_empty() {
        if !existed && explicit.is_none() {
            write_template(&path)?;
            return Err(Error::Config(format!(
                "created template config at {} -- edit it and run again",
                path.display()
            )));
        }
        return Err(Error::Config(format!(
            "missing settings: {}",
            missing.join(", ")
        )));
    }

    let password = decode_password(&file.password.unwrap_or_default())?;

    Ok(Config {
        server: file.server.unwrap_or_default(),
        username: file.username.unwrap_or_default(),
        password,
        folder: file.folder.unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
        timezone: file.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        db_path: file.db_path,
        last: file.last,
    })
}

impl Config {
    /// Recency window for this run: trailing count when `last` is set,
    /// otherwise everything since the start of "today" in the configured
    /// offset.
    pub fn policy(&self) -> Result<RecencyPolicy> {
        if let Some(n) = self.last {
            return Ok(RecencyPolicy::LastN(n));
        }
        let tz: FixedOffset = self
            .timezone
            .parse()
            .map_err(|e| Error::Config(format!("timezone {:?}: {e}", self.timezone)))?;
        Ok(RecencyPolicy::SinceToday { tz })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};

    #[test]
    fn decode_password_roundtrip() {
        let encoded = general_purpose::STANDARD.encode("s3cret!");
        assert_eq!(decode_password(&encoded).unwrap(), "s3cret!");
    }

    #[test]
    fn decode_password_rejects_bad_base64() {
        let err = decode_password("not base64!!!").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn decode_password_rejects_non_utf8() {
        let encoded = general_purpose::STANDARD.encode([0xff, 0xfe]);
        assert!(matches!(
            decode_password(&encoded),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let file: FileConfig =
            toml::from_str("server = \"imap.example.com\"\nlast = 5\n").unwrap();
        assert_eq!(file.server.as_deref(), Some("imap.example.com"));
        assert_eq!(file.last, Some(5));
        assert!(file.username.is_none());
    }

    #[test]
    fn policy_prefers_by_count() {
        let cfg = Config {
            server: "imap.example.com".into(),
            username: "u".into(),
            password: "p".into(),
            folder: "INBOX".into(),
            timezone: "+08:00".into(),
            db_path: None,
            last: Some(10),
        };
        assert!(matches!(cfg.policy().unwrap(), RecencyPolicy::LastN(10)));
    }

    #[test]
    fn policy_defaults_to_by_date() {
        let cfg = Config {
            server: "imap.example.com".into(),
            username: "u".into(),
            password: "p".into(),
            folder: "INBOX".into(),
            timezone: "+02:00".into(),
            db_path: None,
            last: None,
        };
        match cfg.policy().unwrap() {
            RecencyPolicy::SinceToday { tz } => {
                assert_eq!(tz.local_minus_utc(), 2 * 3600);
            }
            other => panic!("unexpected policy: {other:?}"),
        }
    }

    #[test]
    fn policy_rejects_garbage_timezone() {
        let cfg = Config {
            server: "imap.example.com".into(),
            username: "u".into(),
            password: "p".into(),
            folder: "INBOX".into(),
            timezone: "Mars/Olympus".into(),
            db_path: None,
            last: None,
        };
        assert!(matches!(cfg.policy(), Err(Error::Config(_))));
    }
}
