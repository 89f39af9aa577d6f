//! RetentionSweeper - 保持期間を過ぎた object の削除
//!
//! object の日付は key のフォルダ部分（UTC の 0 時）から読む。
//! `now - threshold` がその時刻より後なら削除対象。
//! フォルダが日付として読めない key には触らない。

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::domain::BackupError;
use crate::ports::ObjectStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub kept: usize,
    pub skipped_malformed: usize,
    pub failed: usize,
}

pub struct RetentionSweeper {
    store: Arc<dyn ObjectStore>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Only a failed listing is an error. Individual delete failures are
    /// counted in the report and the sweep moves on.
    pub async fn sweep(
        &self,
        threshold: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, BackupError> {
        let cutoff = now - threshold;
        let objects = self.store.list().await?;
        if objects.is_empty() {
            info!(bucket = self.store.bucket(), "no backups in cold storage");
        }

        let mut report = SweepReport::default();
        for object in objects {
            let Some((folder_date, _)) = object.dated_path() else {
                debug!(key = %object.key, "key does not carry a date folder, skipping");
                report.skipped_malformed += 1;
                continue;
            };

            if !is_expired(folder_date, cutoff) {
                report.kept += 1;
                continue;
            }

            match self.store.delete(&object.key).await {
                Ok(true) => {
                    info!(key = %object.key, "deleted expired backup");
                    report.deleted += 1;
                }
                Ok(false) => debug!(key = %object.key, "expired backup already gone"),
                Err(e) => {
                    warn!(key = %object.key, error = %e, "failed to delete expired backup");
                    report.failed += 1;
                }
            }
        }

        info!(
            deleted = report.deleted,
            kept = report.kept,
            skipped = report.skipped_malformed,
            failed = report.failed,
            "retention sweep finished"
        );
        Ok(report)
    }
}

pub fn is_expired(folder_date: NaiveDate, cutoff: DateTime<Utc>) -> bool {
    cutoff > folder_date.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::object::object_key;
    use crate::impls::InMemoryObjectStore;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap()
    }

    fn key_aged(days: i64) -> String {
        let date = (now() - TimeDelta::days(days)).date_naive();
        object_key(date, "a.com_01-01-2024-00-00-00.zip")
    }

    #[tokio::test]
    async fn deletes_only_objects_past_retention() {
        let store = Arc::new(
            InMemoryObjectStore::new("bucket")
                .with_object(key_aged(10), 1)
                .with_object(key_aged(45), 1),
        );
        let sweeper = RetentionSweeper::new(store.clone());

        let report = sweeper.sweep(TimeDelta::days(30), now()).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.kept, 1);
        assert_eq!(store.deleted(), vec![key_aged(45)]);
    }

    #[tokio::test]
    async fn malformed_keys_are_left_alone() {
        let store = Arc::new(
            InMemoryObjectStore::new("bucket")
                .with_object("loose-file.zip", 1)
                .with_object("2024-01-01/a.zip", 1)
                .with_object("01-01-2001/a/b.zip", 1),
        );
        let report = RetentionSweeper::new(store.clone())
            .sweep(TimeDelta::days(1), now())
            .await
            .unwrap();

        assert_eq!(report.skipped_malformed, 3);
        assert!(store.deleted().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_does_not_stop_the_sweep() {
        let store = Arc::new(
            InMemoryObjectStore::new("bucket")
                .with_object(key_aged(40), 1)
                .with_object(key_aged(50), 1)
                .failing_deletes_for(key_aged(40)),
        );
        let report = RetentionSweeper::new(store.clone())
            .sweep(TimeDelta::days(30), now())
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(store.keys(), vec![key_aged(40)]);
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let store = Arc::new(InMemoryObjectStore::new("bucket").failing_listings(1));
        let err = RetentionSweeper::new(store)
            .sweep(TimeDelta::days(30), now())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[rstest]
    #[case(0, 0, true)]
    #[case(1, 0, false)]
    #[case(1, 1, true)]
    #[case(30, 29, false)]
    #[case(30, 30, true)]
    #[case(30, 31, true)]
    fn expiry_uses_midnight_of_folder_date(
        #[case] threshold_days: i64,
        #[case] age_days: i64,
        #[case] expired: bool,
    ) {
        // now は 09:30 なので、ちょうど threshold 日前のフォルダは 0 時の時点で期限切れ
        let folder = (now() - TimeDelta::days(age_days)).date_naive();
        let cutoff = now() - TimeDelta::days(threshold_days);
        assert_eq!(is_expired(folder, cutoff), expired);
    }
}
