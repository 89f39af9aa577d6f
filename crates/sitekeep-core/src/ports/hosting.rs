//! HostingApi port - ホスティング事業者の REST API
//!
//! サイト一覧・バックアップの開始・状態取得・アーカイブのダウンロードを提供する。
//!
//! # 実装
//! - **TwentyIClient**: reqwest による本番用
//! - **InMemoryHosting**: テスト用

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::domain::{BackupError, BackupJob, BackupOptions, Site, TriggerResult};

/// Archive bytes as they arrive from the provider.
pub type ByteStream = BoxStream<'static, Result<Bytes, BackupError>>;

/// HostingApi は事業者 API への薄いアダプタ
///
/// # 設計原則
/// - HTTP ステータスは実装側で [`BackupError`] に写像する
/// - 除外サイトや重複の扱いはここでは行わない（RemoteSiteDirectory の責務）
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// All sites on the account. An empty account is `Ok(vec![])`.
    async fn list_sites(&self) -> Result<Vec<Site>, BackupError>;

    /// Ask the provider to start producing a backup. Does not wait for it.
    async fn trigger_backup(
        &self,
        site: &Site,
        options: BackupOptions,
    ) -> Result<TriggerResult, BackupError>;

    /// Current state of the site's latest backup.
    async fn backup_job(&self, site: &Site) -> Result<BackupJob, BackupError>;

    /// Open a streaming download of a completed backup.
    async fn download(&self, url: &str) -> Result<ByteStream, BackupError>;
}
