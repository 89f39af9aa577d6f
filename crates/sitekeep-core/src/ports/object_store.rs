//! ObjectStore port - コールドストレージ（B2 など）
//!
//! # 実装
//! - **B2Client**: Backblaze B2 native API
//! - **InMemoryObjectStore**: テスト用

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{BackupError, RemoteObject};

/// ObjectStore は 1 つの bucket に対する list / put / delete
///
/// # 設計原則
/// - put は all-or-nothing（途中で失敗した upload が object として見えないこと）
/// - put はストレージ側が受け取ったバイト数を返す。呼び出し側はこれで検証する
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket name, for logs.
    fn bucket(&self) -> &str;

    async fn list(&self) -> Result<Vec<RemoteObject>, BackupError>;

    /// Upload the file at `path` (`size` bytes) under `key`.
    /// Returns the size confirmed by the backend.
    async fn put(&self, key: &str, path: &Path, size: u64) -> Result<u64, BackupError>;

    /// `Ok(false)` if there was nothing to delete.
    async fn delete(&self, key: &str) -> Result<bool, BackupError>;
}
