//! Outcome model: the resolved result of one unit of work in a run.
//!
//! Every site (or leftover artifact) ends a run in exactly one of three
//! states. Nothing stays pending across an invocation.

use serde::{Deserialize, Serialize};

use super::errors::{BackupError, ErrorKind};

/// Serialized as SCREAMING_SNAKE_CASE in the run summary:
/// SUCCEEDED / SKIPPED / FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Succeeded,
    Skipped,
    Failed,
}

/// A reference to something produced or touched while handling a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Evidence {
    /// Local artifact path.
    LocalFile(String),

    /// Object key in cold storage.
    ObjectKey(String),

    /// Bytes confirmed by the storage backend.
    ConfirmedBytes(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Set only for FAILED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

impl Outcome {
    pub fn succeeded() -> Self {
        Self {
            kind: OutcomeKind::Succeeded,
            reason: None,
            error_kind: None,
            evidence: Vec::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Skipped,
            reason: Some(reason.into()),
            error_kind: None,
            evidence: Vec::new(),
        }
    }

    pub fn failed(error: &BackupError) -> Self {
        Self {
            kind: OutcomeKind::Failed,
            reason: Some(error.to_string()),
            error_kind: Some(error.kind()),
            evidence: Vec::new(),
        }
    }

    /// The remote side refused the request outright.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failed,
            reason: Some(reason.into()),
            error_kind: Some(ErrorKind::Permanent),
            evidence: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.kind == OutcomeKind::Failed
    }
}
