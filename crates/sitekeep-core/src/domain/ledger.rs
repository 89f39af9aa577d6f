//! RunLedger - 1 回の実行で扱った対象ごとの結果
//!
//! 実行開始時に作り、終了時に捨てる（永続化しない）。
//! 実行をまたいだ冪等性はローカルファイルと object の存在チェックが担う。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{RunId, SiteId};
use super::outcome::{Outcome, OutcomeKind};
use super::site::Site;

/// Which stage sequence an invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Backup,
    Download,
    Cleanup,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Download => "download",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a ledger entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    Site { id: SiteId, name: String },

    /// A file left in the backup directory by an earlier run.
    Artifact { file_name: String },

    /// The cold-storage bucket as a whole (retention sweep).
    Bucket { name: String },
}

impl From<&Site> for Subject {
    fn from(site: &Site) -> Self {
        Self::Site {
            id: site.id.clone(),
            name: site.name.clone(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Site { id, name } => write!(f, "site {name} (id={id})"),
            Self::Artifact { file_name } => write!(f, "artifact {file_name}"),
            Self::Bucket { name } => write!(f, "bucket {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub subject: Subject,
    pub outcome: Outcome,
}

/// Counts per outcome, logged at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Append-only record of per-subject outcomes for one invocation.
#[derive(Debug, Clone)]
pub struct RunLedger {
    run_id: RunId,
    mode: RunMode,
    entries: Vec<LedgerEntry>,
}

impl RunLedger {
    pub fn new(run_id: RunId, mode: RunMode) -> Self {
        Self {
            run_id,
            mode,
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn record(&mut self, subject: impl Into<Subject>, outcome: Outcome) {
        self.entries.push(LedgerEntry {
            subject: subject.into(),
            outcome,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn outcome_for(&self, subject: &Subject) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|entry| &entry.subject == subject)
            .map(|entry| &entry.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(|entry| entry.outcome.is_failure())
    }

    pub fn summary(&self) -> RunSummary {
        self.entries
            .iter()
            .fold(RunSummary::default(), |mut summary, entry| {
                match entry.outcome.kind {
                    OutcomeKind::Succeeded => summary.succeeded += 1,
                    OutcomeKind::Skipped => summary.skipped += 1,
                    OutcomeKind::Failed => summary.failed += 1,
                }
                summary
            })
    }

    /// true iff every outcome is SUCCEEDED or SKIPPED. An empty run succeeds.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}
