//! InMemoryObjectStore - テスト・開発用の ObjectStore 実装
//!
//! put はファイルを実際に読み、そのサイズを確認済みサイズとして返す。
//! `confirming_short_by` でストレージ側のサイズ不一致を再現できる。

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::{BackupError, RemoteObject};
use crate::ports::ObjectStore;

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, (RemoteObject, Vec<u8>)>,
    short_by: u64,
    failing_deletes: HashSet<String>,
    listing_failures: u32,
    put_failures: u32,

    puts: Vec<String>,
    deletes: Vec<String>,
}

pub struct InMemoryObjectStore {
    bucket: String,
    state: Mutex<StoreState>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Mutex::new(StoreState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_object(self, key: impl Into<String>, size: u64) -> Self {
        let key = key.into();
        self.state()
            .objects
            .insert(key.clone(), (RemoteObject::new(key, size), Vec::new()));
        self
    }

    /// Every put reports `bytes` fewer than it received.
    pub fn confirming_short_by(self, bytes: u64) -> Self {
        self.state().short_by = bytes;
        self
    }

    pub fn failing_deletes_for(self, key: impl Into<String>) -> Self {
        self.state().failing_deletes.insert(key.into());
        self
    }

    pub fn failing_listings(self, times: u32) -> Self {
        self.state().listing_failures = times;
        self
    }

    pub fn failing_puts(self, times: u32) -> Self {
        self.state().put_failures = times;
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.state().objects.get(key).map(|(_, bytes)| bytes.clone())
    }

    pub fn put_count(&self) -> usize {
        self.state().puts.len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state().deletes.clone()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self) -> Result<Vec<RemoteObject>, BackupError> {
        let mut state = self.state();
        if state.listing_failures > 0 {
            state.listing_failures -= 1;
            return Err(BackupError::RemoteUnavailable("listing timed out".to_string()));
        }
        Ok(state.objects.values().map(|(object, _)| object.clone()).collect())
    }

    async fn put(&self, key: &str, path: &Path, _size: u64) -> Result<u64, BackupError> {
        // ロックを持ったまま await しない
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BackupError::local_io(path, e))?;

        let mut state = self.state();
        state.puts.push(key.to_string());
        if state.put_failures > 0 {
            state.put_failures -= 1;
            return Err(BackupError::RemoteUnavailable("upload timed out".to_string()));
        }
        let confirmed = (bytes.len() as u64).saturating_sub(state.short_by);
        state.objects.insert(
            key.to_string(),
            (RemoteObject::new(key, confirmed), bytes),
        );
        Ok(confirmed)
    }

    async fn delete(&self, key: &str) -> Result<bool, BackupError> {
        let mut state = self.state();
        if state.failing_deletes.contains(key) {
            return Err(BackupError::RemoteUnavailable(format!("delete of {key} timed out")));
        }
        let existed = state.objects.remove(key).is_some();
        if existed {
            state.deletes.push(key.to_string());
        }
        Ok(existed)
    }
}
