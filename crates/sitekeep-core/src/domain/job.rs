//! Remote backup job state and trigger types.
//!
//! BackupJob はこのシステムでは永続化しない。必要なときに問い合わせるだけ。

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SiteId;

/// Status of the most recent server-side backup for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// No backup has ever been produced (or the provider answered 404).
    None,
    InProgress,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupJob {
    pub site_id: SiteId,
    pub status: BackupStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
}

impl BackupJob {
    /// A job for a site that has nothing to offer yet.
    pub fn none(site_id: SiteId) -> Self {
        Self {
            site_id,
            status: BackupStatus::None,
            created_at: None,
            download_url: None,
        }
    }

    pub fn ready(site_id: SiteId, created_at: DateTime<Utc>, download_url: impl Into<String>) -> Self {
        Self {
            site_id,
            status: BackupStatus::Ready,
            created_at: Some(created_at),
            download_url: Some(download_url.into()),
        }
    }

    /// `created_at` と `download_url` が揃った Ready のときだけ Some を返す
    pub fn downloadable(&self) -> Option<(DateTime<Utc>, &str)> {
        if self.status != BackupStatus::Ready {
            return None;
        }
        match (self.created_at, self.download_url.as_deref()) {
            (Some(created_at), Some(url)) => Some((created_at, url)),
            _ => None,
        }
    }
}

/// What to include in a server-side backup. Serialized as the trigger body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions {
    pub files: bool,
    pub databases: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            files: true,
            databases: true,
        }
    }
}

/// Provider's answer to a trigger request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    Accepted,
    Rejected(String),
}

/// Parse a provider timestamp.
///
/// Accepts RFC 3339 as well as the naive `YYYY-MM-DD HH:MM:SS` form, which is
/// read as UTC.
pub fn parse_provider_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
