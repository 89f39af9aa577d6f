//! sitekeep-core
//!
//! Scheduled backups for sites on a hosting provider: ask the provider to take
//! a backup, pull finished archives to local disk, move them to cold storage,
//! and prune cold storage past a retention threshold.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, site, job, artifact, object, outcome, ledger, decision, errors）
//! - **ports**: 抽象化レイヤー（HostingApi, ObjectStore, Clock）
//! - **app**: 各ステージとコーディネーター
//! - **impls**: 実装（20i / B2 の HTTP クライアント、開発用の in-memory 実装）
//! - **config**: TOML + 環境変数からの設定読み込み

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{BackupLifecycleCoordinator, BuildError, CoordinatorBuilder};
pub use config::Config;
pub use domain::{BackupError, RunLedger, RunMode};
