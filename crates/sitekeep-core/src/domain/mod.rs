//! Domain model (IDs, sites, jobs, artifacts, objects, outcomes, ledger, ...).
//!
//! このモジュールは HTTP やファイルシステムを知らない。
//! 外部とのやりとりは `ports` の trait 越しに行う。

pub mod artifact;
pub mod decision;
pub mod errors;
pub mod ids;
pub mod job;
pub mod ledger;
pub mod object;
pub mod outcome;
pub mod retry;
pub mod site;

pub use self::artifact::{LocalArtifact, PART_SUFFIX};
pub use self::decision::{Decider, Decision, DefaultDecider};
pub use self::errors::{BackupError, ErrorKind};
pub use self::ids::{RunId, SiteId};
pub use self::job::{BackupJob, BackupOptions, BackupStatus, TriggerResult};
pub use self::ledger::{LedgerEntry, RunLedger, RunMode, RunSummary, Subject};
pub use self::object::{ArchivedNames, RemoteObject};
pub use self::outcome::{Evidence, Outcome, OutcomeKind};
pub use self::retry::RetryPolicy;
pub use self::site::Site;
