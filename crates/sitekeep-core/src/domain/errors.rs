//! Errors - エラー型と分類
//!
//! # 分類
//! - **RemoteUnavailable**: 通信・DNS・タイムアウト・5xx（再実行で直る可能性がある）
//! - **RemoteRejected**: 404 以外の 4xx（設定を直さない限り直らない）
//! - **NotFound**: 404。「まだデータがない」として呼び出し側で吸収する
//! - **LocalIo**: ディスクフル・権限など（そのサイトは失敗、他は継続）
//! - **Integrity**: アップロード後のサイズ不一致（ローカルのコピーは残す）

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 一時的なエラー（次回の実行で直る可能性がある）
    Transient,
    /// 恒久的なエラー（設定の修正が必要）
    Permanent,
    /// ローカル環境の障害（ディスク・権限）
    Infrastructure,
}

/// BackupError はドメインエラー
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote rejected request: HTTP {status} on {url}")]
    RemoteRejected { status: u16, url: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("local I/O error on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload size mismatch: local file has {expected} bytes, storage confirmed {confirmed}")]
    Integrity { expected: u64, confirmed: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BackupError {
    pub fn local_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RemoteUnavailable(_) | Self::NotFound(_) | Self::Integrity { .. } => {
                ErrorKind::Transient
            }
            Self::RemoteRejected { .. } | Self::Config(_) => ErrorKind::Permanent,
            Self::LocalIo { .. } => ErrorKind::Infrastructure,
        }
    }

    /// 同じ実行の中でもう一度試す価値があるか
    ///
    /// Integrity は Transient だが、同じ実行で再送しても同じ結果になりやすいので
    /// 次回の実行に任せる。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}
