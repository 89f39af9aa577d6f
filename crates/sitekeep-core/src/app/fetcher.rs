//! ArtifactFetcher - 完成済みバックアップのダウンロード
//!
//! # 不変条件
//! - ダウンロードは `<artifact>.part` に書き込み、最後に rename する
//! - 失敗時は `.part` を消す。最終ファイル名に不完全なファイルが現れることはない
//! - 同じバックアップがローカルにある / cold storage にある場合はダウンロードしない
//! - 起動時に消す `.part` は chunk_timeout より長く更新されていないものだけ
//!   （並行して動いている別プロセスのダウンロードは消さない）

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::domain::{ArchivedNames, BackupError, BackupJob, LocalArtifact, PART_SUFFIX, Site};
use crate::ports::HostingApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The artifact is on local disk. `downloaded` is false when an earlier
    /// run had already fetched it.
    Fetched {
        artifact: LocalArtifact,
        downloaded: bool,
    },

    /// No completed backup on the provider side.
    NotReady,

    /// The same artifact is already in cold storage under `key`.
    AlreadyArchived { key: String },
}

pub struct ArtifactFetcher {
    api: Arc<dyn HostingApi>,
    backup_dir: PathBuf,
    chunk_timeout: Duration,
}

impl ArtifactFetcher {
    /// `chunk_timeout` bounds the wait for each piece of the body, so a
    /// stalled transfer fails even when the overall timeout is generous.
    pub fn new(api: Arc<dyn HostingApi>, backup_dir: PathBuf, chunk_timeout: Duration) -> Self {
        Self {
            api,
            backup_dir,
            chunk_timeout,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Create the backup directory and remove `.part` files left behind by an
    /// interrupted process. Returns how many were removed.
    ///
    /// A download in progress writes at least once per `chunk_timeout`, so a
    /// `.part` file untouched for longer than that has no live writer.
    pub async fn prepare(&self) -> Result<usize, BackupError> {
        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| BackupError::local_io(&self.backup_dir, e))?;

        let mut entries = fs::read_dir(&self.backup_dir)
            .await
            .map_err(|e| BackupError::local_io(&self.backup_dir, e))?;
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::local_io(&self.backup_dir, e))?
        {
            let path = entry.path();
            let is_part = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PART_SUFFIX));
            if !is_part {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|meta| meta.modified())
                .map_err(|e| BackupError::local_io(&path, e))?;
            let idle = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if idle <= self.chunk_timeout {
                debug!(path = %path.display(), "partial download is still being written, leaving it");
                continue;
            }
            fs::remove_file(&path)
                .await
                .map_err(|e| BackupError::local_io(&path, e))?;
            warn!(path = %path.display(), "removed incomplete download from an earlier run");
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn fetch(
        &self,
        site: &Site,
        archived: &ArchivedNames,
    ) -> Result<FetchResult, BackupError> {
        let job = match self.api.backup_job(site).await {
            Ok(job) => job,
            // まだ一度もバックアップされていないサイトは 404 になる
            Err(BackupError::NotFound(_)) => BackupJob::none(site.id.clone()),
            Err(e) => return Err(e),
        };

        let Some((created_at, url)) = job.downloadable() else {
            info!(status = ?job.status, "no completed backup available");
            return Ok(FetchResult::NotReady);
        };

        let artifact = LocalArtifact::for_backup(&self.backup_dir, &site.name, created_at)?;

        if fs::try_exists(&artifact.file_path)
            .await
            .map_err(|e| BackupError::local_io(&artifact.file_path, e))?
        {
            info!(file = artifact.file_name(), "backup already downloaded");
            return Ok(FetchResult::Fetched {
                artifact,
                downloaded: false,
            });
        }

        if let Some(key) = archived.key_for(artifact.file_name()) {
            info!(key, "backup already in cold storage");
            return Ok(FetchResult::AlreadyArchived {
                key: key.to_string(),
            });
        }

        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| BackupError::local_io(&self.backup_dir, e))?;

        info!(file = artifact.file_name(), "downloading backup");
        let bytes = self.download_to(&artifact, url).await?;
        info!(file = artifact.file_name(), bytes, "download complete");

        Ok(FetchResult::Fetched {
            artifact,
            downloaded: true,
        })
    }

    async fn download_to(&self, artifact: &LocalArtifact, url: &str) -> Result<u64, BackupError> {
        let part = artifact.part_path();
        match self.stream_into(&part, url).await {
            Ok(bytes) => {
                fs::rename(&part, &artifact.file_path)
                    .await
                    .map_err(|e| BackupError::local_io(&artifact.file_path, e))?;
                Ok(bytes)
            }
            Err(err) => {
                if let Err(e) = fs::remove_file(&part).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %part.display(), error = %e, "could not remove partial download");
                }
                Err(err)
            }
        }
    }

    async fn stream_into(&self, part: &Path, url: &str) -> Result<u64, BackupError> {
        let mut body = self.api.download(url).await?;
        let mut file = fs::File::create(part)
            .await
            .map_err(|e| BackupError::local_io(part, e))?;

        let mut written: u64 = 0;
        loop {
            let next = tokio::time::timeout(self.chunk_timeout, body.next())
                .await
                .map_err(|_| {
                    BackupError::RemoteUnavailable(format!(
                        "download stalled for {:?}",
                        self.chunk_timeout
                    ))
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| BackupError::local_io(part, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| BackupError::local_io(part, e))?;
        file.sync_all().await.map_err(|e| BackupError::local_io(part, e))?;
        debug!(path = %part.display(), written, "download flushed");
        Ok(written)
    }
}
