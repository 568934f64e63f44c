use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::target::FetchTarget;

/// Contents of `meta.json`, written next to every fetched artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub build: String,
    pub platform: String,
    /// RFC 3339 with an explicit UTC offset.
    pub fetched_at: DateTime<FixedOffset>,
    pub source_url: String,
}

impl MetadataRecord {
    pub fn for_target(target: &FetchTarget, fetched_at: DateTime<FixedOffset>) -> Self {
        Self {
            build: target.build().to_owned(),
            platform: target.platform().to_owned(),
            fetched_at,
            source_url: target.source_url().to_owned(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Read a previously written `meta.json`.
    pub fn read(path: &Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(std::io::Error::other)
    }
}

/// Offset applied to `fetched_at` timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timezone {
    /// The host's local offset at the moment of the fetch.
    #[default]
    Local,
    /// A fixed offset such as `+05:30`.
    Fixed(FixedOffset),
}

impl Timezone {
    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            Self::Local => Local::now().fixed_offset(),
            Self::Fixed(offset) => Utc::now().with_timezone(offset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid UTC offset {0:?}: expected `local` or a value like `+05:30`")]
pub struct TimezoneError(pub String);

impl FromStr for Timezone {
    type Err = TimezoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(Self::Fixed(Utc.fix()));
        }
        s.parse::<FixedOffset>()
            .map(Self::Fixed)
            .map_err(|_| TimezoneError(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::TimeZone;

    use crate::target::resolve;

    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    #[test]
    fn json_has_expected_fields() {
        let targets =
            resolve(&["3025"], &["windows"], "https://host/repo", Path::new("out")).unwrap();
        let target = &targets[0];
        let fetched_at = ist().with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap();
        let record = MetadataRecord::for_target(target, fetched_at);

        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["build"], "3025");
        assert_eq!(value["platform"], "windows");
        assert_eq!(value["fetched_at"], "2024-03-01T09:15:00+05:30");
        assert_eq!(
            value["source_url"],
            "https://host/repo/3025/windows/latest_commits.txt"
        );
    }

    #[test]
    fn written_record_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let targets = resolve(&["3025"], &["linux"], "https://host/repo/", dir.path()).unwrap();
        let target = &targets[0];
        let record = MetadataRecord::for_target(target, Timezone::Local.now());

        let path = dir.path().join("meta.json");
        std::fs::write(&path, record.to_json().unwrap()).unwrap();

        let parsed = MetadataRecord::read(&path).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.build, target.build());
        assert_eq!(parsed.platform, target.platform());
        assert_eq!(parsed.source_url, target.source_url());
    }

    #[test]
    fn parse_timezones() {
        assert_eq!("local".parse::<Timezone>(), Ok(Timezone::Local));
        assert_eq!("+05:30".parse::<Timezone>(), Ok(Timezone::Fixed(ist())));
        assert_eq!(
            "UTC".parse::<Timezone>(),
            Ok(Timezone::Fixed(FixedOffset::east_opt(0).unwrap()))
        );
        assert!("half past".parse::<Timezone>().is_err());
    }

    #[test]
    fn fixed_timezone_applies_offset() {
        let now = Timezone::Fixed(ist()).now();
        assert_eq!(now.offset(), &ist());
    }
}
