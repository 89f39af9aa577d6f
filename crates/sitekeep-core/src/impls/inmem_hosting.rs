//! InMemoryHosting - テスト・開発用の HostingApi 実装
//!
//! # 実装詳細
//! - std::sync::Mutex で状態を保持（ロック中に await しない）
//! - 呼び出し履歴（trigger / 状態問い合わせ / ダウンロード）を記録し、テストから検証できる
//! - 一覧取得の失敗やダウンロード途中の切断・停止を注入できる
//! - trigger の呼び出し中に任意の処理（例: shutdown 通知）を差し込める

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;

use crate::domain::{BackupError, BackupJob, BackupOptions, Site, SiteId, TriggerResult};
use crate::ports::{ByteStream, HostingApi};

const CHUNK_SIZE: usize = 1024;

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct HostingState {
    sites: Vec<Site>,
    jobs: HashMap<SiteId, BackupJob>,
    payloads: HashMap<String, Vec<u8>>,
    rejected: HashSet<SiteId>,
    broken_downloads: HashSet<String>,
    stalled_downloads: HashSet<String>,
    trigger_hooks: HashMap<SiteId, Hook>,
    listing_failures: u32,
    job_query_failures: HashMap<SiteId, u32>,

    triggers: Vec<(SiteId, BackupOptions)>,
    job_queries: Vec<SiteId>,
    downloads: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryHosting {
    state: Mutex<HostingState>,
}

impl InMemoryHosting {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_site(self, id: impl Into<SiteId>, name: impl Into<String>) -> Self {
        self.state().sites.push(Site::new(id, name));
        self
    }

    /// A completed backup whose archive is `payload`.
    pub fn with_ready_backup(
        self,
        site_id: impl Into<SiteId>,
        created_at: DateTime<Utc>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        self.set_ready_backup(site_id, created_at, payload);
        self
    }

    pub fn with_job(self, job: BackupJob) -> Self {
        self.state().jobs.insert(job.site_id.clone(), job);
        self
    }

    pub fn rejecting_triggers_for(self, site_id: impl Into<SiteId>) -> Self {
        self.state().rejected.insert(site_id.into());
        self
    }

    /// The next `times` site listings fail as unavailable.
    pub fn failing_listings(self, times: u32) -> Self {
        self.state().listing_failures = times;
        self
    }

    /// The next `times` status queries for `site_id` fail as unavailable.
    pub fn failing_job_queries(self, site_id: impl Into<SiteId>, times: u32) -> Self {
        self.state().job_query_failures.insert(site_id.into(), times);
        self
    }

    /// Downloads for `site_id` deliver half the archive and then drop.
    pub fn breaking_downloads_for(self, site_id: impl Into<SiteId>) -> Self {
        let site_id = site_id.into();
        let mut state = self.state();
        let urls: Vec<String> = state
            .jobs
            .get(&site_id)
            .and_then(|job| job.download_url.clone())
            .into_iter()
            .collect();
        state.broken_downloads.extend(urls);
        drop(state);
        self
    }

    /// Downloads for `site_id` deliver the first chunk and then never send
    /// another byte. Call after `with_ready_backup`.
    pub fn stalling_downloads_for(self, site_id: impl Into<SiteId>) -> Self {
        let site_id = site_id.into();
        let mut state = self.state();
        let urls: Vec<String> = state
            .jobs
            .get(&site_id)
            .and_then(|job| job.download_url.clone())
            .into_iter()
            .collect();
        state.stalled_downloads.extend(urls);
        drop(state);
        self
    }

    /// Run `hook` every time a backup is requested for `site_id`, before the
    /// request is answered.
    pub fn on_trigger(
        self,
        site_id: impl Into<SiteId>,
        hook: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.state().trigger_hooks.insert(site_id.into(), Arc::new(hook));
        self
    }

    /// Publish (or replace) a completed backup for a site.
    pub fn set_ready_backup(
        &self,
        site_id: impl Into<SiteId>,
        created_at: DateTime<Utc>,
        payload: impl Into<Vec<u8>>,
    ) {
        let site_id = site_id.into();
        let url = format!("mem://{site_id}/{}", created_at.timestamp());
        let mut state = self.state();
        state.payloads.insert(url.clone(), payload.into());
        state
            .jobs
            .insert(site_id.clone(), BackupJob::ready(site_id, created_at, url));
    }

    pub fn triggered(&self) -> Vec<SiteId> {
        self.state().triggers.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn trigger_options(&self) -> Vec<BackupOptions> {
        self.state().triggers.iter().map(|(_, options)| *options).collect()
    }

    pub fn job_queries(&self) -> Vec<SiteId> {
        self.state().job_queries.clone()
    }

    pub fn download_count(&self) -> usize {
        self.state().downloads.len()
    }
}

#[async_trait]
impl HostingApi for InMemoryHosting {
    async fn list_sites(&self) -> Result<Vec<Site>, BackupError> {
        let mut state = self.state();
        if state.listing_failures > 0 {
            state.listing_failures -= 1;
            return Err(BackupError::RemoteUnavailable("listing timed out".to_string()));
        }
        Ok(state.sites.clone())
    }

    async fn trigger_backup(
        &self,
        site: &Site,
        options: BackupOptions,
    ) -> Result<TriggerResult, BackupError> {
        let hook = {
            let mut state = self.state();
            state.triggers.push((site.id.clone(), options));
            state.trigger_hooks.get(&site.id).cloned()
        };
        if let Some(hook) = hook {
            hook();
        }
        if self.state().rejected.contains(&site.id) {
            return Ok(TriggerResult::Rejected("HTTP 403".to_string()));
        }
        Ok(TriggerResult::Accepted)
    }

    async fn backup_job(&self, site: &Site) -> Result<BackupJob, BackupError> {
        let mut state = self.state();
        state.job_queries.push(site.id.clone());
        if let Some(left) = state.job_query_failures.get_mut(&site.id)
            && *left > 0
        {
            *left -= 1;
            return Err(BackupError::RemoteUnavailable("status query timed out".to_string()));
        }
        match state.jobs.get(&site.id) {
            Some(job) => Ok(job.clone()),
            None => Err(BackupError::NotFound(format!("mem://{}", site.id))),
        }
    }

    async fn download(&self, url: &str) -> Result<ByteStream, BackupError> {
        let mut state = self.state();
        state.downloads.push(url.to_string());
        let payload = state
            .payloads
            .get(url)
            .cloned()
            .ok_or_else(|| BackupError::NotFound(url.to_string()))?;

        let mut chunks: Vec<Result<Bytes, BackupError>> = payload
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if state.broken_downloads.contains(url) {
            chunks.truncate(chunks.len() / 2);
            chunks.push(Err(BackupError::RemoteUnavailable(
                "connection reset by peer".to_string(),
            )));
        }
        if state.stalled_downloads.contains(url) {
            chunks.truncate(1);
            return Ok(stream::iter(chunks).chain(stream::pending()).boxed());
        }
        Ok(stream::iter(chunks).boxed())
    }
}
