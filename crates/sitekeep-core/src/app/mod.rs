//! App - アプリケーション層
//!
//! ports を組み合わせてバックアップのライフサイクルを実装する。
//!
//! # 主要コンポーネント
//! - **RemoteSiteDirectory**: 対象サイトの一覧
//! - **BackupJobTrigger**: バックアップ開始要求
//! - **ArtifactFetcher**: 完成済みバックアップのダウンロード
//! - **ColdStorageTransfer**: cold storage への転送
//! - **RetentionSweeper**: 保持期間切れの削除
//! - **BackupLifecycleCoordinator** / **CoordinatorBuilder**: 上記をモードごとに組み合わせる

pub mod builder;
pub mod coordinator;
pub mod directory;
pub mod fetcher;
pub mod sweeper;
pub mod transfer;
pub mod trigger;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, CoordinatorBuilder};
pub use self::coordinator::BackupLifecycleCoordinator;
pub use self::directory::RemoteSiteDirectory;
pub use self::fetcher::{ArtifactFetcher, FetchResult};
pub use self::sweeper::{RetentionSweeper, SweepReport};
pub use self::transfer::{ColdStorageTransfer, Transferred};
pub use self::trigger::BackupJobTrigger;
