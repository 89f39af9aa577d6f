//! ColdStorageTransfer - ローカル成果物を cold storage へ移す
//!
//! # 不変条件
//! - ストレージが確認したサイズがローカルのサイズと一致したときだけローカルを消す
//! - object key は `<転送日 dd-mm-YYYY>/<ファイル名>`
//! - 同名でもサイズが違う object は転送済みとみなさない（途中で切れたアップロード）

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::object::object_key;
use crate::domain::{ArchivedNames, BackupError, LocalArtifact, RemoteObject};
use crate::ports::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    pub key: String,
    pub size: u64,
}

pub struct ColdStorageTransfer {
    store: Arc<dyn ObjectStore>,
    backup_dir: PathBuf,
}

impl ColdStorageTransfer {
    pub fn new(store: Arc<dyn ObjectStore>, backup_dir: PathBuf) -> Self {
        Self { store, backup_dir }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Everything currently in the bucket.
    pub async fn archived(&self) -> Result<Vec<RemoteObject>, BackupError> {
        self.store.list().await
    }

    pub async fn transfer(
        &self,
        artifact: &LocalArtifact,
        run_date: NaiveDate,
    ) -> Result<Transferred, BackupError> {
        let path = &artifact.file_path;
        let size = fs::metadata(path)
            .await
            .map_err(|e| BackupError::local_io(path, e))?
            .len();
        let key = object_key(run_date, artifact.file_name());

        info!(key = %key, size, bucket = self.store.bucket(), "upload initiated");
        let confirmed = self.store.put(&key, path, size).await?;
        if confirmed != size {
            warn!(key = %key, expected = size, confirmed, "size mismatch, keeping local copy");
            return Err(BackupError::Integrity {
                expected: size,
                confirmed,
            });
        }

        fs::remove_file(path)
            .await
            .map_err(|e| BackupError::local_io(path, e))?;
        info!(key = %key, "uploaded backup ({}), deleted local copy", format_bytes(size));
        Ok(Transferred { key, size })
    }

    /// Delete the local copy when the bucket already holds an object with the
    /// same file name and the same size. Returns that object's key.
    pub async fn release_if_archived(
        &self,
        artifact: &LocalArtifact,
        archived: &ArchivedNames,
    ) -> Result<Option<String>, BackupError> {
        let path = &artifact.file_path;
        let size = fs::metadata(path)
            .await
            .map_err(|e| BackupError::local_io(path, e))?
            .len();
        let Some(key) = archived.confirmed_copy(artifact.file_name(), size) else {
            if let Some(key) = archived.key_for(artifact.file_name()) {
                warn!(key, size, "archived copy has a different size, uploading again");
            }
            return Ok(None);
        };

        fs::remove_file(path)
            .await
            .map_err(|e| BackupError::local_io(path, e))?;
        info!(key, "already in cold storage ({}), deleted local copy", format_bytes(size));
        Ok(Some(key.to_string()))
    }

    /// Artifacts sitting in the backup directory, oldest file name first.
    /// `.part` files and anything not named like an artifact are ignored.
    pub async fn pending(&self) -> Result<Vec<LocalArtifact>, BackupError> {
        let dir = &self.backup_dir;
        if !fs::try_exists(dir)
            .await
            .map_err(|e| BackupError::local_io(dir, e))?
        {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| BackupError::local_io(dir, e))?;
        let mut pending = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::local_io(dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| BackupError::local_io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(artifact) = LocalArtifact::from_path(&entry.path()) {
                pending.push(artifact);
            }
        }
        pending.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(pending)
    }
}

/// Human-readable size, decimal units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["kB", "MB", "GB", "TB"];
    match bytes {
        1 => "1 byte".to_string(),
        0..1000 => format!("{bytes} bytes"),
        _ => {
            let mut value = bytes as f64 / 1000.0;
            let mut unit = 0;
            while value >= 1000.0 && unit < UNITS.len() - 1 {
                value /= 1000.0;
                unit += 1;
            }
            format!("{value:.2} {}", UNITS[unit])
        }
    }
}
