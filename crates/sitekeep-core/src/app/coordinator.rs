//! BackupLifecycleCoordinator - 1 回の起動で 1 つのモードを実行する
//!
//! # モード
//! - **backup**: サイト一覧 → 各サイトでバックアップ開始を要求
//! - **download**: サイト一覧 → 完成済みバックアップを取得 → cold storage へ転送、
//!   最後に前回までの取り残しを転送
//! - **cleanup**: 保持期間を過ぎた object を削除
//!
//! # 実行モデル
//! - サイト単位の失敗は RunLedger に記録して次へ進む
//! - 何も始められなかった場合（サイト一覧や bucket 一覧の失敗）だけ Err を返す
//! - 各リモート手順は Decider の判断でリトライする
//! - 同時に処理するサイト数は `concurrency` まで。ledger の順序はサイト一覧の順序
//! - shutdown が立ったら新しいサイトは始めず Skipped("interrupted") を記録する

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};
use futures::StreamExt;
use futures::stream;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::directory::RemoteSiteDirectory;
use super::fetcher::{ArtifactFetcher, FetchResult};
use super::sweeper::RetentionSweeper;
use super::transfer::ColdStorageTransfer;
use super::trigger::BackupJobTrigger;
use crate::domain::{
    ArchivedNames, BackupError, BackupOptions, Decider, Decision, Evidence, LocalArtifact,
    Outcome, RunId, RunLedger, RunMode, Site, Subject, TriggerResult,
};
use crate::ports::Clock;

const INTERRUPTED: &str = "interrupted";

pub struct BackupLifecycleCoordinator {
    pub(super) directory: RemoteSiteDirectory,
    pub(super) trigger: BackupJobTrigger,
    pub(super) fetcher: ArtifactFetcher,
    pub(super) transfer: ColdStorageTransfer,
    pub(super) sweeper: RetentionSweeper,
    pub(super) options: BackupOptions,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) decider: Arc<dyn Decider>,
    pub(super) retention: TimeDelta,
    pub(super) concurrency: usize,
    pub(super) shutdown: watch::Receiver<bool>,
}

impl BackupLifecycleCoordinator {
    pub async fn run(&self, mode: RunMode) -> Result<RunLedger, BackupError> {
        let run_id = RunId::generate(self.clock.now());
        let span = info_span!("run", run_id = %run_id, mode = %mode);

        async move {
            info!("run started");
            let ledger = match mode {
                RunMode::Backup => self.run_backup(run_id).await,
                RunMode::Download => self.run_download(run_id).await,
                RunMode::Cleanup => self.run_cleanup(run_id).await,
            };
            match &ledger {
                Ok(ledger) => log_summary(ledger),
                Err(e) => error!(error = %e, "run could not start"),
            }
            ledger
        }
        .instrument(span)
        .await
    }

    async fn run_backup(&self, run_id: RunId) -> Result<RunLedger, BackupError> {
        let mut ledger = RunLedger::new(run_id, RunMode::Backup);
        let sites = self.discover().await?;

        for (site, outcome) in self.for_each_site(&sites, |site| self.backup_site(site)).await {
            ledger.record(site, outcome.unwrap_or_else(|| Outcome::skipped(INTERRUPTED)));
        }
        Ok(ledger)
    }

    async fn backup_site(&self, site: &Site) -> Outcome {
        let triggered = self
            .with_retry("trigger backup", || self.trigger.trigger(site, self.options))
            .await;
        match triggered {
            Ok(TriggerResult::Accepted) => Outcome::succeeded().with_reason("backup scheduled"),
            Ok(TriggerResult::Rejected(reason)) => {
                Outcome::rejected(format!("backup request rejected: {reason}"))
            }
            Err(e) => {
                error!(error = %e, "backup request failed");
                Outcome::failed(&e)
            }
        }
    }

    async fn run_download(&self, run_id: RunId) -> Result<RunLedger, BackupError> {
        let mut ledger = RunLedger::new(run_id, RunMode::Download);
        let sites = self.discover().await?;

        let objects = self
            .with_retry("list cold storage", || self.transfer.archived())
            .await?;
        let archived = ArchivedNames::from_objects(&objects);
        debug!(objects = objects.len(), "listed cold storage");

        self.fetcher.prepare().await?;
        let run_date = self.clock.now().date_naive();

        let results = self
            .for_each_site(&sites, |site| self.download_site(site, &archived, run_date))
            .await;

        let mut touched = HashSet::new();
        for (site, result) in results {
            match result {
                Some((outcome, file_name)) => {
                    touched.extend(file_name);
                    ledger.record(site, outcome);
                }
                None => ledger.record(site, Outcome::skipped(INTERRUPTED)),
            }
        }

        for artifact in self.transfer.pending().await? {
            if touched.contains(artifact.file_name()) {
                continue;
            }
            let subject = Subject::Artifact {
                file_name: artifact.file_name().to_string(),
            };
            if self.is_shutting_down() {
                ledger.record(subject, Outcome::skipped(INTERRUPTED));
                continue;
            }
            info!(file = artifact.file_name(), "handling leftover artifact");
            let outcome = self.store_artifact(&artifact, &archived, run_date).await;
            ledger.record(subject, outcome);
        }
        Ok(ledger)
    }

    /// Returns the outcome and the local file name this site produced, if any.
    async fn download_site(
        &self,
        site: &Site,
        archived: &ArchivedNames,
        run_date: NaiveDate,
    ) -> (Outcome, Option<String>) {
        let fetched = self
            .with_retry("fetch backup", || self.fetcher.fetch(site, archived))
            .await;

        match fetched {
            Ok(FetchResult::Fetched {
                artifact,
                downloaded,
            }) => {
                debug!(file = artifact.file_name(), downloaded, "backup on local disk");
                let outcome = self.store_artifact(&artifact, archived, run_date).await;
                (outcome, Some(artifact.file_name().to_string()))
            }
            Ok(FetchResult::NotReady) => (Outcome::skipped("no completed backup"), None),
            Ok(FetchResult::AlreadyArchived { key }) => (
                Outcome::skipped("already in cold storage").with_evidence(Evidence::ObjectKey(key)),
                None,
            ),
            Err(e) => {
                error!(error = %e, "could not fetch backup");
                (Outcome::failed(&e), None)
            }
        }
    }

    /// Release the local copy if an equal-size object is already archived,
    /// otherwise upload it.
    async fn store_artifact(
        &self,
        artifact: &LocalArtifact,
        archived: &ArchivedNames,
        run_date: NaiveDate,
    ) -> Outcome {
        match self.transfer.release_if_archived(artifact, archived).await {
            Ok(Some(key)) => Outcome::skipped("already in cold storage")
                .with_evidence(Evidence::ObjectKey(key)),
            Ok(None) => self.transfer_artifact(artifact, run_date).await,
            Err(e) => {
                error!(file = artifact.file_name(), error = %e, "could not inspect local copy");
                Outcome::failed(&e)
                    .with_evidence(Evidence::LocalFile(artifact.file_path.display().to_string()))
            }
        }
    }

    async fn transfer_artifact(&self, artifact: &LocalArtifact, run_date: NaiveDate) -> Outcome {
        let local = Evidence::LocalFile(artifact.file_path.display().to_string());
        match self
            .with_retry("upload backup", || self.transfer.transfer(artifact, run_date))
            .await
        {
            Ok(done) => Outcome::succeeded()
                .with_evidence(Evidence::ObjectKey(done.key))
                .with_evidence(Evidence::ConfirmedBytes(done.size)),
            Err(e) => {
                error!(file = artifact.file_name(), error = %e, "transfer failed, local copy kept");
                Outcome::failed(&e).with_evidence(local)
            }
        }
    }

    async fn run_cleanup(&self, run_id: RunId) -> Result<RunLedger, BackupError> {
        let mut ledger = RunLedger::new(run_id, RunMode::Cleanup);
        let now = self.clock.now();
        let report = self
            .with_retry("retention sweep", || self.sweeper.sweep(self.retention, now))
            .await?;

        ledger.record(
            Subject::Bucket {
                name: self.sweeper.bucket().to_string(),
            },
            Outcome::succeeded().with_reason(format!(
                "deleted {}, kept {}, skipped {} malformed, {} delete failures",
                report.deleted, report.kept, report.skipped_malformed, report.failed
            )),
        );
        Ok(ledger)
    }

    async fn discover(&self) -> Result<Vec<Site>, BackupError> {
        let sites = self
            .with_retry("list sites", || self.directory.list_sites())
            .await?;
        if sites.is_empty() {
            info!("no sites found");
        }
        Ok(sites)
    }

    /// Run `work` for every site with at most `concurrency` in flight.
    /// Results come back in listing order. `None` marks a site that was not
    /// started because shutdown was requested.
    async fn for_each_site<'a, F, Fut, T>(
        &'a self,
        sites: &'a [Site],
        work: F,
    ) -> Vec<(&'a Site, Option<T>)>
    where
        F: Fn(&'a Site) -> Fut,
        Fut: Future<Output = T> + 'a,
    {
        let work = &work;
        stream::iter(sites)
            .map(|site| async move {
                if self.is_shutting_down() {
                    debug!(site = %site.name, "shutdown requested, not starting site");
                    return (site, None);
                }
                let span = info_span!("site", site_id = %site.id, site = %site.name);
                (site, Some(work(site).instrument(span).await))
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn with_retry<T, F, Fut>(&self, step: &str, mut op: F) -> Result<T, BackupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackupError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match self.decider.decide(attempts, &err) {
                Decision::Retry { delay, reason } => {
                    let delay_ms = delay.as_millis() as u64;
                    warn!(step, attempts, delay_ms, error = %err, %reason, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Decision::GiveUp { reason } => {
                    debug!(step, attempts, %reason, "giving up");
                    return Err(err);
                }
            }
        }
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

fn log_summary(ledger: &RunLedger) {
    for entry in ledger.failures() {
        error!(
            subject = %entry.subject,
            reason = entry.outcome.reason.as_deref().unwrap_or_default(),
            "failed"
        );
    }
    let summary = ledger.summary();
    info!(
        total = summary.total(),
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        "run finished"
    );
}
