//! reqwest の共通処理: クライアント構築とステータスコードの写像
//!
//! ステータスは数値で分岐する:
//! - 2xx → Ok
//! - 404 → NotFound（「まだデータがない」）
//! - その他の 4xx → RemoteRejected
//! - 5xx などそれ以外 → RemoteUnavailable
//!
//! URL はクエリ文字列に署名やトークンを含むことがあるので、
//! エラーメッセージに載せる前に落とす。

use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};

use crate::domain::BackupError;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, BackupError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| BackupError::Config(format!("http client build failed: {e}")))
}

pub(crate) fn classify_status(status: StatusCode, url: &str) -> Result<(), BackupError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        404 => Err(BackupError::NotFound(redact_url(url))),
        400..=499 => Err(BackupError::RemoteRejected {
            status: status.as_u16(),
            url: redact_url(url),
        }),
        _ => Err(BackupError::RemoteUnavailable(format!(
            "HTTP {} on {}",
            status.as_u16(),
            redact_url(url)
        ))),
    }
}

/// Pass a response through if its status is 2xx.
pub(crate) fn check(response: Response) -> Result<Response, BackupError> {
    classify_status(response.status(), response.url().as_str())?;
    Ok(response)
}

/// Transport, timeout and body-decode failures all count as "remote unavailable".
pub(crate) fn transport_error(err: reqwest::Error) -> BackupError {
    let what = if err.is_timeout() {
        "timed out"
    } else if err.is_decode() {
        "unexpected response body"
    } else {
        "transport error"
    };
    let url = err.url().map(|url| redact_url(url.as_str()));
    let err = err.without_url();
    match url {
        Some(url) => BackupError::RemoteUnavailable(format!("{what} on {url}: {err}")),
        None => BackupError::RemoteUnavailable(format!("{what}: {err}")),
    }
}

pub(crate) fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
