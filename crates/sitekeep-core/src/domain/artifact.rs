//! Local backup artifacts and their deterministic file names.
//!
//! The file name is `<site_name>_<dd-mm-YYYY-HH-MM-SS>.zip`, built from the
//! backup's `created_at` truncated to whole seconds (UTC). The same remote
//! backup always maps to the same file, which is what makes repeated
//! `download` runs idempotent.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use super::errors::BackupError;

pub const ARTIFACT_EXTENSION: &str = ".zip";

/// Suffix for in-progress downloads. Never treated as an artifact.
pub const PART_SUFFIX: &str = ".part";

const FILE_TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H-%M-%S";

/// A backup archive for one site, on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub site_name: String,
    pub created_at: DateTime<Utc>,
    pub file_path: PathBuf,
}

impl LocalArtifact {
    /// Build the artifact location for a backup of `site_name` taken at `created_at`.
    pub fn for_backup(
        backup_dir: &Path,
        site_name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, BackupError> {
        let file_name = artifact_file_name(site_name, created_at)
            .ok_or_else(|| invalid_site_name(backup_dir, site_name))?;
        Ok(Self {
            site_name: site_name.to_string(),
            // 表示と比較を揃えるため秒未満は落としておく
            created_at: truncate_to_seconds(created_at),
            file_path: backup_dir.join(file_name),
        })
    }

    /// Recognise an artifact left in `backup_dir` by an earlier run.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let (site_name, created_at) = parse_artifact_file_name(file_name)?;
        Some(Self {
            site_name,
            created_at,
            file_path: path.to_path_buf(),
        })
    }

    pub fn file_name(&self) -> &str {
        self.file_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// Temporary path the download is streamed into before the final rename.
    pub fn part_path(&self) -> PathBuf {
        let mut name = self.file_path.as_os_str().to_os_string();
        name.push(PART_SUFFIX);
        PathBuf::from(name)
    }
}

/// `None` if `site_name` cannot be used as a file-name component.
pub fn artifact_file_name(site_name: &str, created_at: DateTime<Utc>) -> Option<String> {
    if !is_valid_site_name(site_name) {
        return None;
    }
    Some(format!(
        "{site_name}_{}{ARTIFACT_EXTENSION}",
        created_at.format(FILE_TIMESTAMP_FORMAT)
    ))
}

pub fn parse_artifact_file_name(file_name: &str) -> Option<(String, DateTime<Utc>)> {
    let stem = file_name.strip_suffix(ARTIFACT_EXTENSION)?;
    let (site_name, stamp) = stem.rsplit_once('_')?;
    if !is_valid_site_name(site_name) {
        return None;
    }
    let created_at = NaiveDateTime::parse_from_str(stamp, FILE_TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    Some((site_name.to_string(), created_at))
}

fn is_valid_site_name(site_name: &str) -> bool {
    !site_name.is_empty()
        && site_name != "."
        && site_name != ".."
        && !site_name.contains(['/', '\\', '\0'])
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

fn invalid_site_name(backup_dir: &Path, site_name: &str) -> BackupError {
    BackupError::local_io(
        backup_dir,
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("site name {site_name:?} is not usable as a file name"),
        ),
    )
}
