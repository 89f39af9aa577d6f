//! End-to-end runs of the coordinator over the in-memory adapters.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::watch;

use sitekeep_core::domain::object::object_key;
use sitekeep_core::domain::{
    Decider, DefaultDecider, ErrorKind, Evidence, OutcomeKind, RetryPolicy, RunMode, Site,
    SiteId, Subject,
};
use sitekeep_core::impls::{InMemoryHosting, InMemoryObjectStore};
use sitekeep_core::ports::FixedClock;
use sitekeep_core::{BackupError, CoordinatorBuilder};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
}

fn taken_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
}

fn quick_retry() -> Arc<dyn Decider> {
    Arc::new(DefaultDecider::new(
        RetryPolicy::new(Duration::from_millis(1), 1.0),
        3,
    ))
}

fn builder(
    hosting: &Arc<InMemoryHosting>,
    store: &Arc<InMemoryObjectStore>,
    dir: &Path,
) -> CoordinatorBuilder {
    CoordinatorBuilder::new()
        .hosting(hosting.clone())
        .object_store(store.clone())
        .backup_dir(dir)
        .clock(Arc::new(FixedClock::new(now())))
        .decider(quick_retry())
}

fn site_subject(id: u64, name: &str) -> Subject {
    Subject::from(&Site::new(id, name))
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut entries| entries.next().is_none()).unwrap_or(true)
}

fn age_file(path: &Path, by: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

#[tokio::test]
async fn backup_triggers_every_site_except_the_excluded_one() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_site(2u64, "b.com")
            .with_site(3u64, "x.com"),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path())
        .excluded_site(Some("x.com".to_string()))
        .build()
        .unwrap();

    let ledger = coordinator.run(RunMode::Backup).await.unwrap();

    assert_eq!(hosting.triggered(), vec![SiteId::from(1u64), SiteId::from(2u64)]);
    assert_eq!(ledger.summary().succeeded, 2);
    assert!(ledger.outcome_for(&site_subject(3, "x.com")).is_none());
    assert!(ledger.is_success());
}

#[tokio::test]
async fn rejected_trigger_fails_only_that_site() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_site(2u64, "b.com")
            .rejecting_triggers_for(1u64),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Backup).await.unwrap();

    let rejected = ledger.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(rejected.kind, OutcomeKind::Failed);
    assert_eq!(rejected.error_kind, Some(ErrorKind::Permanent));
    let accepted = ledger.outcome_for(&site_subject(2, "b.com")).unwrap();
    assert_eq!(accepted.kind, OutcomeKind::Succeeded);
    assert!(!ledger.is_success());
}

#[tokio::test]
async fn empty_account_is_a_successful_run() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(InMemoryHosting::new());
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    for mode in [RunMode::Backup, RunMode::Download] {
        let ledger = coordinator.run(mode).await.unwrap();
        assert!(ledger.entries().is_empty());
        assert!(ledger.is_success());
    }
}

#[tokio::test]
async fn site_listing_that_never_recovers_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(InMemoryHosting::new().with_site(1u64, "a.com").failing_listings(5));
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let err = coordinator.run(RunMode::Backup).await.unwrap_err();
    assert!(matches!(err, BackupError::RemoteUnavailable(_)));
    assert!(hosting.triggered().is_empty());
}

#[tokio::test]
async fn transient_listing_failure_is_retried() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(InMemoryHosting::new().with_site(1u64, "a.com").failing_listings(2));
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Backup).await.unwrap();
    assert_eq!(ledger.summary().succeeded, 1);
}

#[tokio::test]
async fn download_moves_ready_backups_to_cold_storage() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_site(2u64, "b.com")
            .with_ready_backup(1u64, taken_at(), b"a-archive".to_vec()),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    let key = "10-03-2024/a.com_09-03-2024-14-05-07.zip";
    assert_eq!(store.keys(), vec![key.to_string()]);
    assert_eq!(store.contents(key).unwrap(), b"a-archive");
    assert!(dir_is_empty(dir.path()));

    let a = ledger.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(a.kind, OutcomeKind::Succeeded);
    assert!(a.evidence.contains(&Evidence::ObjectKey(key.to_string())));
    assert!(a.evidence.contains(&Evidence::ConfirmedBytes(9)));

    let b = ledger.outcome_for(&site_subject(2, "b.com")).unwrap();
    assert_eq!(b.kind, OutcomeKind::Skipped);
    assert!(ledger.is_success());
}

#[tokio::test]
async fn second_download_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), b"a-archive".to_vec()),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    coordinator.run(RunMode::Download).await.unwrap();
    let keys_after_first = store.keys();
    let second = coordinator.run(RunMode::Download).await.unwrap();

    assert_eq!(hosting.download_count(), 1);
    assert_eq!(store.put_count(), 1);
    assert_eq!(store.keys(), keys_after_first);
    let outcome = second.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Skipped);
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn existing_local_artifact_is_uploaded_without_downloading() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.com_09-03-2024-14-05-07.zip"), b"from-last-run").unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), b"a-archive".to_vec()),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    assert_eq!(hosting.download_count(), 0);
    assert_eq!(
        store.contents("10-03-2024/a.com_09-03-2024-14-05-07.zip").unwrap(),
        b"from-last-run"
    );
    // 同じファイルを取り残しとして二重に扱わない
    assert_eq!(ledger.entries().len(), 1);
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn size_mismatch_keeps_the_local_artifact_and_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), b"a-archive".to_vec()),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket").confirming_short_by(1));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    let local = dir.path().join("a.com_09-03-2024-14-05-07.zip");
    assert!(local.exists());
    let outcome = ledger.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Transient));
    assert!(
        outcome
            .evidence
            .contains(&Evidence::LocalFile(local.display().to_string()))
    );
    // 整合性エラーはその回の中ではリトライしない
    assert_eq!(store.put_count(), 1);
    assert!(!ledger.is_success());
}

#[tokio::test]
async fn interrupted_download_never_leaves_a_final_file() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), vec![9u8; 8192])
            .breaking_downloads_for(1u64),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    assert_eq!(hosting.download_count(), 3);
    assert!(dir_is_empty(dir.path()));
    assert_eq!(store.put_count(), 0);
    let outcome = ledger.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failed);
}

#[tokio::test]
async fn stale_part_files_are_cleared_before_downloading() {
    let dir = TempDir::new().unwrap();
    let part = dir.path().join("a.com_01-01-2024-00-00-00.zip.part");
    std::fs::write(&part, b"half").unwrap();
    age_file(&part, Duration::from_secs(3600));
    let hosting = Arc::new(InMemoryHosting::new().with_site(1u64, "a.com"));
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    coordinator.run(RunMode::Download).await.unwrap();
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn excluded_site_is_never_queried_or_fetched() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_site(3u64, "x.com")
            .with_ready_backup(3u64, taken_at(), b"x".to_vec()),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path())
        .excluded_site(Some("x.com".to_string()))
        .build()
        .unwrap();

    coordinator.run(RunMode::Download).await.unwrap();

    assert_eq!(hosting.job_queries(), vec![SiteId::from(1u64)]);
    assert_eq!(hosting.download_count(), 0);
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn transient_status_errors_are_retried_per_site() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), b"a".to_vec())
            .failing_job_queries(1u64, 2),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    assert_eq!(hosting.job_queries().len(), 3);
    assert!(ledger.is_success());
    assert_eq!(store.keys().len(), 1);
}

#[tokio::test]
async fn leftover_artifacts_are_transferred() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("gone.com_01-03-2024-01-02-03.zip"), b"orphan").unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"not an artifact").unwrap();
    let hosting = Arc::new(InMemoryHosting::new().with_site(1u64, "a.com"));
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    let subject = Subject::Artifact {
        file_name: "gone.com_01-03-2024-01-02-03.zip".to_string(),
    };
    assert_eq!(ledger.outcome_for(&subject).unwrap().kind, OutcomeKind::Succeeded);
    assert_eq!(
        store.keys(),
        vec!["10-03-2024/gone.com_01-03-2024-01-02-03.zip".to_string()]
    );
    assert!(dir.path().join("readme.txt").exists());
}

#[tokio::test]
async fn concurrent_runs_keep_listing_order() {
    let dir = TempDir::new().unwrap();
    let mut hosting = InMemoryHosting::new();
    for id in 1..=6u64 {
        hosting = hosting
            .with_site(id, format!("site{id}.com"))
            .with_ready_backup(id, taken_at(), format!("archive-{id}").into_bytes());
    }
    let hosting = Arc::new(hosting);
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path())
        .concurrency(3)
        .build()
        .unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    let subjects: Vec<Subject> = ledger.entries().iter().map(|e| e.subject.clone()).collect();
    let expected: Vec<Subject> = (1..=6u64)
        .map(|id| site_subject(id, &format!("site{id}.com")))
        .collect();
    assert_eq!(subjects, expected);
    assert_eq!(ledger.summary().succeeded, 6);
    assert_eq!(store.keys().len(), 6);
}

#[tokio::test]
async fn shutdown_before_start_skips_every_site() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_site(2u64, "b.com"),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let coordinator = builder(&hosting, &store, dir.path())
        .shutdown(shutdown_rx)
        .build()
        .unwrap();

    shutdown_tx.send(true).unwrap();
    let ledger = coordinator.run(RunMode::Backup).await.unwrap();

    assert!(hosting.triggered().is_empty());
    assert_eq!(ledger.summary().skipped, 2);
    assert!(
        ledger
            .entries()
            .iter()
            .all(|e| e.outcome.reason.as_deref() == Some("interrupted"))
    );
    assert!(ledger.is_success());
}

#[tokio::test]
async fn cleanup_deletes_only_expired_backups() {
    let dir = TempDir::new().unwrap();
    let aged = |days: i64| {
        object_key(
            (now() - TimeDelta::days(days)).date_naive(),
            "a.com_01-01-2024-00-00-00.zip",
        )
    };
    let hosting = Arc::new(InMemoryHosting::new());
    let store = Arc::new(
        InMemoryObjectStore::new("bucket")
            .with_object(aged(10), 1)
            .with_object(aged(45), 1)
            .with_object("not-dated.zip", 1),
    );
    let coordinator = builder(&hosting, &store, dir.path())
        .retention(TimeDelta::days(30))
        .build()
        .unwrap();

    let ledger = coordinator.run(RunMode::Cleanup).await.unwrap();

    assert_eq!(store.deleted(), vec![aged(45)]);
    assert_eq!(ledger.entries().len(), 1);
    let entry = &ledger.entries()[0];
    assert_eq!(
        entry.subject,
        Subject::Bucket {
            name: "bucket".to_string()
        }
    );
    assert_eq!(entry.outcome.kind, OutcomeKind::Succeeded);
    assert!(entry.outcome.reason.as_deref().unwrap().starts_with("deleted 1,"));
}

#[tokio::test]
async fn cleanup_delete_failures_do_not_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let key = object_key(
        (now() - TimeDelta::days(90)).date_naive(),
        "a.com_01-01-2024-00-00-00.zip",
    );
    let hosting = Arc::new(InMemoryHosting::new());
    let store = Arc::new(
        InMemoryObjectStore::new("bucket")
            .with_object(key.clone(), 1)
            .failing_deletes_for(key.clone()),
    );
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Cleanup).await.unwrap();

    assert!(ledger.is_success());
    assert_eq!(store.keys(), vec![key]);
}

#[tokio::test]
async fn cleanup_listing_failure_is_an_error() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(InMemoryHosting::new());
    let store = Arc::new(InMemoryObjectStore::new("bucket").failing_listings(10));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    assert!(coordinator.run(RunMode::Cleanup).await.is_err());
}

#[tokio::test]
async fn two_sites_with_one_excluded_trigger_once() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_site(2u64, "b.com"),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path())
        .excluded_site(Some("b.com".to_string()))
        .build()
        .unwrap();

    coordinator.run(RunMode::Backup).await.unwrap();

    assert_eq!(hosting.triggered(), vec![SiteId::from(1u64)]);
}

#[tokio::test]
async fn artifact_already_on_disk_needs_no_download() {
    let dir = TempDir::new().unwrap();
    let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    std::fs::write(dir.path().join("a.com_01-01-2024-00-00-00.zip"), b"zip").unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, created_at, b"zip".to_vec()),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    assert_eq!(hosting.download_count(), 0);
    assert_eq!(
        store.keys(),
        vec!["10-03-2024/a.com_01-01-2024-00-00-00.zip".to_string()]
    );
    assert!(ledger.is_success());
}

#[tokio::test]
async fn truncated_copy_in_cold_storage_does_not_stop_a_leftover_upload() {
    let dir = TempDir::new().unwrap();
    let leftover = dir.path().join("a.com_08-03-2024-10-00-00.zip");
    std::fs::write(&leftover, b"twelve bytes").unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), b"a-archive".to_vec()),
    );
    let store = Arc::new(
        InMemoryObjectStore::new("bucket")
            .with_object("09-03-2024/a.com_08-03-2024-10-00-00.zip", 5),
    );
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    let subject = Subject::Artifact {
        file_name: "a.com_08-03-2024-10-00-00.zip".to_string(),
    };
    assert_eq!(ledger.outcome_for(&subject).unwrap().kind, OutcomeKind::Succeeded);
    assert_eq!(
        store.contents("10-03-2024/a.com_08-03-2024-10-00-00.zip").unwrap(),
        b"twelve bytes"
    );
    assert!(!leftover.exists());
    assert!(dir_is_empty(dir.path()));
    assert!(ledger.is_success());
}

#[tokio::test]
async fn leftover_with_an_equal_size_copy_is_released_without_upload() {
    let dir = TempDir::new().unwrap();
    let leftover = dir.path().join("gone.com_01-03-2024-01-02-03.zip");
    std::fs::write(&leftover, b"orphan").unwrap();
    let hosting = Arc::new(InMemoryHosting::new());
    let store = Arc::new(
        InMemoryObjectStore::new("bucket")
            .with_object("02-03-2024/gone.com_01-03-2024-01-02-03.zip", 6),
    );
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    let subject = Subject::Artifact {
        file_name: "gone.com_01-03-2024-01-02-03.zip".to_string(),
    };
    let outcome = ledger.outcome_for(&subject).unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Skipped);
    assert!(outcome.evidence.contains(&Evidence::ObjectKey(
        "02-03-2024/gone.com_01-03-2024-01-02-03.zip".to_string()
    )));
    assert_eq!(store.put_count(), 0);
    assert!(!leftover.exists());
}

#[tokio::test]
async fn local_artifact_already_archived_on_an_earlier_day_is_not_uploaded_again() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("a.com_09-03-2024-14-05-07.zip");
    std::fs::write(&local, b"a-archive").unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), b"a-archive".to_vec()),
    );
    let store = Arc::new(
        InMemoryObjectStore::new("bucket")
            .with_object("09-03-2024/a.com_09-03-2024-14-05-07.zip", 9),
    );
    let coordinator = builder(&hosting, &store, dir.path()).build().unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    assert_eq!(store.put_count(), 0);
    assert_eq!(hosting.download_count(), 0);
    assert!(!local.exists());
    let outcome = ledger.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Skipped);
    assert!(outcome.evidence.contains(&Evidence::ObjectKey(
        "09-03-2024/a.com_09-03-2024-14-05-07.zip".to_string()
    )));
    assert_eq!(ledger.entries().len(), 1);
}

#[tokio::test]
async fn stalled_download_fails_the_site_after_the_chunk_timeout() {
    let dir = TempDir::new().unwrap();
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_ready_backup(1u64, taken_at(), vec![5u8; 4096])
            .stalling_downloads_for(1u64),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path())
        .chunk_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let ledger = coordinator.run(RunMode::Download).await.unwrap();

    let outcome = ledger.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Transient));
    assert_eq!(hosting.download_count(), 3);
    assert_eq!(store.put_count(), 0);
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn shutdown_mid_run_finishes_the_current_site_and_skips_the_rest() {
    let dir = TempDir::new().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let hosting = Arc::new(
        InMemoryHosting::new()
            .with_site(1u64, "a.com")
            .with_site(2u64, "b.com")
            .with_site(3u64, "c.com")
            .on_trigger(1u64, move || {
                let _ = shutdown_tx.send(true);
            }),
    );
    let store = Arc::new(InMemoryObjectStore::new("bucket"));
    let coordinator = builder(&hosting, &store, dir.path())
        .shutdown(shutdown_rx)
        .build()
        .unwrap();

    let ledger = coordinator.run(RunMode::Backup).await.unwrap();

    assert_eq!(hosting.triggered(), vec![SiteId::from(1u64)]);
    let first = ledger.outcome_for(&site_subject(1, "a.com")).unwrap();
    assert_eq!(first.kind, OutcomeKind::Succeeded);
    for (id, name) in [(2u64, "b.com"), (3u64, "c.com")] {
        let outcome = ledger.outcome_for(&site_subject(id, name)).unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Skipped);
        assert_eq!(outcome.reason.as_deref(), Some("interrupted"));
    }
    assert!(ledger.is_success());
}
