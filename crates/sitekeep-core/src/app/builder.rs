//! CoordinatorBuilder - コーディネーターの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - hosting API / object store / backup dir のどれかが欠けていれば build() が BuildError を返す
//! - それ以外は既定値（SystemClock、既定の RetryPolicy、並列数 1）で埋める

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::watch;

use super::coordinator::BackupLifecycleCoordinator;
use super::directory::RemoteSiteDirectory;
use super::fetcher::ArtifactFetcher;
use super::sweeper::RetentionSweeper;
use super::transfer::ColdStorageTransfer;
use super::trigger::BackupJobTrigger;
use crate::config::Config;
use crate::domain::{BackupError, BackupOptions, Decider, DefaultDecider, RetryPolicy};
use crate::ports::{Clock, HostingApi, ObjectStore, SystemClock};

const DEFAULT_RETENTION_DAYS: i64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// # 使用例
/// ```ignore
/// let coordinator = CoordinatorBuilder::new()
///     .hosting(Arc::new(hosting))
///     .object_store(Arc::new(store))
///     .backup_dir("./backups")
///     .build()?;
/// let ledger = coordinator.run(RunMode::Download).await?;
/// ```
pub struct CoordinatorBuilder {
    hosting: Option<Arc<dyn HostingApi>>,
    store: Option<Arc<dyn ObjectStore>>,
    backup_dir: Option<PathBuf>,
    excluded_site: Option<String>,
    options: BackupOptions,
    retention: TimeDelta,
    concurrency: usize,
    chunk_timeout: Duration,
    clock: Arc<dyn Clock>,
    decider: Arc<dyn Decider>,
    shutdown: Option<watch::Receiver<bool>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no hosting API client was configured")]
    MissingHostingApi,

    #[error("no object store was configured")]
    MissingObjectStore,

    #[error("no backup directory was configured")]
    MissingBackupDir,

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("retention threshold must not be negative")]
    NegativeRetention,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            hosting: None,
            store: None,
            backup_dir: None,
            excluded_site: None,
            options: BackupOptions::default(),
            retention: TimeDelta::days(DEFAULT_RETENTION_DAYS),
            concurrency: 1,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            clock: Arc::new(SystemClock),
            decider: Arc::new(DefaultDecider::new(
                RetryPolicy::default(),
                DEFAULT_MAX_ATTEMPTS,
            )),
            shutdown: None,
        }
    }

    /// Wire the production HTTP clients and every setting from `config`.
    pub fn from_config(config: &Config) -> Result<Self, BackupError> {
        let hosting = config.hosting_client()?;
        let store = config.storage_client()?;
        Ok(Self::new()
            .hosting(Arc::new(hosting))
            .object_store(Arc::new(store))
            .backup_dir(config.backup_dir.clone())
            .excluded_site(config.excluded_site.clone())
            .backup_options(config.backup)
            .retention(config.retention())
            .concurrency(config.concurrency)
            .chunk_timeout(config.request_timeout())
            .decider(Arc::new(config.decider())))
    }

    pub fn hosting(mut self, hosting: Arc<dyn HostingApi>) -> Self {
        self.hosting = Some(hosting);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn excluded_site(mut self, site: Option<String>) -> Self {
        self.excluded_site = site;
        self
    }

    pub fn backup_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn retention(mut self, retention: TimeDelta) -> Self {
        self.retention = retention;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Longest wait for the next piece of a download body.
    pub fn chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    /// Once the channel reads `true`, no further site is started.
    pub fn shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<BackupLifecycleCoordinator, BuildError> {
        let hosting = self.hosting.ok_or(BuildError::MissingHostingApi)?;
        let store = self.store.ok_or(BuildError::MissingObjectStore)?;
        let backup_dir = self.backup_dir.ok_or(BuildError::MissingBackupDir)?;
        if self.concurrency == 0 {
            return Err(BuildError::InvalidConcurrency);
        }
        if self.retention < TimeDelta::zero() {
            return Err(BuildError::NegativeRetention);
        }

        // 送信側を持たない receiver は最後の値（false）を返し続ける
        let shutdown = self
            .shutdown
            .unwrap_or_else(|| watch::channel(false).1);

        Ok(BackupLifecycleCoordinator {
            directory: RemoteSiteDirectory::new(Arc::clone(&hosting), self.excluded_site),
            trigger: BackupJobTrigger::new(Arc::clone(&hosting)),
            fetcher: ArtifactFetcher::new(hosting, backup_dir.clone(), self.chunk_timeout),
            transfer: ColdStorageTransfer::new(Arc::clone(&store), backup_dir),
            sweeper: RetentionSweeper::new(store),
            options: self.options,
            clock: self.clock,
            decider: self.decider,
            retention: self.retention,
            concurrency: self.concurrency,
            shutdown,
        })
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
