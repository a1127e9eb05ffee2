//! # Application Identity
//!
//! [`AppName`] and [`AppVersion`] describe the running binary. Both are built from
//! compile-time constants, typically injected by the build (`env!`,
//! `option_env!`), so neither constructor fails: malformed version metadata is
//! flagged through validity accessors instead, and callers may warn about it.
//!
//! ```rust
//! use app_bootstrap::app::AppVersion;
//!
//! let version = AppVersion::new(
//!     "v1.4.0",
//!     "0123456789abcdef0123456789abcdef01234567",
//!     "2024-05-01T10:00:00Z",
//! );
//! assert!(version.is_valid());
//! assert_eq!(version.to_string(), "v1.4.0-0123456789abcd-2024-05-01T10:00:00Z");
//! ```

use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat};

pub const DEFAULT_APP_NAME: &str = "unknown";
pub const DEFAULT_APP_TITLE: &str = "Unknown Application";

pub const DEFAULT_VERSION: &str = "v0.0.0-dev";
pub const DEFAULT_COMMIT: &str = "none";
pub const DEFAULT_DATE: &str = "unknown";

const COMMIT_LEN: usize = 20;
const SHORT_COMMIT_LEN: usize = 7;

/// Stable identifier plus human-friendly title.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppName {
    name: String,
    title: String,
}

impl AppName {
    /// Empty inputs fall back to [`DEFAULT_APP_NAME`] and [`DEFAULT_APP_TITLE`].
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        let (name, title) = (name.into(), title.into());
        Self {
            name: if name.is_empty() {
                DEFAULT_APP_NAME.to_string()
            } else {
                name
            },
            title: if title.is_empty() {
                DEFAULT_APP_TITLE.to_string()
            } else {
                title
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Default for AppName {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Build metadata: semantic version, commit hash and build date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppVersion {
    version_raw: String,
    commit_raw: String,
    date_raw: String,
    commit: [u8; COMMIT_LEN],
    date: Option<DateTime<FixedOffset>>,
    version_valid: bool,
    commit_valid: bool,
}

impl AppVersion {
    pub fn new(version: &str, commit: &str, date: &str) -> Self {
        let version_raw = non_empty(version, DEFAULT_VERSION);
        let commit_raw = non_empty(commit, DEFAULT_COMMIT);
        let date_raw = non_empty(date, DEFAULT_DATE);

        let version_valid = semver::Version::parse(
            version_raw.strip_prefix('v').unwrap_or(&version_raw),
        )
        .is_ok();

        let mut hash = [0u8; COMMIT_LEN];
        let commit_valid = match hex::decode(&commit_raw) {
            Ok(bytes) => {
                let n = bytes.len().min(COMMIT_LEN);
                hash[..n].copy_from_slice(&bytes[..n]);
                bytes.len() == COMMIT_LEN
            }
            Err(_) => {
                let raw = commit_raw.as_bytes();
                let n = raw.len().min(COMMIT_LEN);
                hash[..n].copy_from_slice(&raw[..n]);
                false
            }
        };

        let date = DateTime::parse_from_rfc3339(&date_raw).ok();

        Self {
            version_raw,
            commit_raw,
            date_raw,
            commit: hash,
            date,
            version_valid,
            commit_valid,
        }
    }

    /// Version, commit and date all parsed.
    pub fn is_valid(&self) -> bool {
        self.version_valid && self.commit_valid && self.date.is_some()
    }

    pub fn version(&self) -> (&str, bool) {
        (&self.version_raw, self.version_valid)
    }

    pub fn commit_hash(&self) -> ([u8; COMMIT_LEN], bool) {
        (self.commit, self.commit_valid)
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.date
    }

    pub fn short_hash(&self) -> ([u8; SHORT_COMMIT_LEN], bool) {
        let mut short = [0u8; SHORT_COMMIT_LEN];
        short.copy_from_slice(&self.commit[..SHORT_COMMIT_LEN]);
        (short, self.commit_valid)
    }

    /// `version#shorthash`, valid only when both parts are.
    pub fn version_commit(&self) -> (String, bool) {
        let (short, commit_valid) = self.short_hash();
        (
            format!("{}#{}", self.version_raw, hex::encode(short)),
            self.version_valid && commit_valid,
        )
    }
}

impl Default for AppVersion {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.version_raw)?;
        match self.short_hash() {
            (short, true) => write!(f, "{}-", hex::encode(short))?,
            (_, false) => write!(f, "{}-", self.commit_raw)?,
        }
        match self.date {
            Some(date) => f.write_str(&date.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => f.write_str(&self.date_raw),
        }
    }
}

fn non_empty(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
