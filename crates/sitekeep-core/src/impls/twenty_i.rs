//! TwentyIClient - 20i 形式の package API に対する HostingApi 実装
//!
//! - `GET  {base}/package`                              → サイト一覧
//! - `POST {base}/package/{id}/web/websiteBackup`       → バックアップ開始
//! - `GET  {base}/package/{id}/web/websiteBackup`       → 最新バックアップの状態
//!
//! 認証ヘッダは `Authorization: Bearer base64(token)`。

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;

use super::http::{build_client, check, transport_error};
use crate::domain::job::parse_provider_timestamp;
use crate::domain::{
    BackupError, BackupJob, BackupOptions, BackupStatus, Site, SiteId, TriggerResult,
};
use crate::ports::{ByteStream, HostingApi};

pub struct TwentyIClient {
    http: Client,
    api_base: String,
    authorization: String,
    transfer_timeout: Duration,
}

impl TwentyIClient {
    /// API calls use `request_timeout`; archive downloads use `transfer_timeout`.
    pub fn new(
        api_base: impl Into<String>,
        bearer_token: &str,
        request_timeout: Duration,
        transfer_timeout: Duration,
    ) -> Result<Self, BackupError> {
        Ok(Self {
            http: build_client(request_timeout)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            authorization: format!("Bearer {}", STANDARD.encode(bearer_token)),
            transfer_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn backup_endpoint(&self, site: &Site) -> String {
        self.endpoint(&format!("package/{}/web/websiteBackup", site.id))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct PackageRecord {
    id: RawId,
    name: String,
}

impl From<PackageRecord> for Site {
    fn from(record: PackageRecord) -> Self {
        let id = match record.id {
            RawId::Number(n) => SiteId::from(n),
            RawId::Text(s) => SiteId::from(s),
        };
        Site::new(id, record.name)
    }
}

/// Map the provider's backup record onto a [`BackupJob`].
///
/// A record with a download link is ready. An explicit failed/error status
/// wins over everything else. A record that only has a timestamp or status
/// is still in progress.
fn job_from_record(site_id: SiteId, record: &Value) -> BackupJob {
    let created_at = text_field(record, "created_at").and_then(parse_provider_timestamp);
    let download_url = text_field(record, "download_link")
        .filter(|link| !link.is_empty())
        .map(str::to_string);
    let raw_status = text_field(record, "status").map(str::to_ascii_lowercase);

    let status = match raw_status.as_deref() {
        Some("failed" | "error") => BackupStatus::Failed,
        _ if download_url.is_some() => BackupStatus::Ready,
        Some(_) => BackupStatus::InProgress,
        None if created_at.is_some() => BackupStatus::InProgress,
        None => BackupStatus::None,
    };

    BackupJob {
        site_id,
        status,
        created_at,
        download_url,
    }
}

fn text_field<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str).map(str::trim)
}

#[async_trait]
impl HostingApi for TwentyIClient {
    async fn list_sites(&self) -> Result<Vec<Site>, BackupError> {
        let url = self.endpoint("package");
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(transport_error)?;
        let response = match check(response) {
            Ok(response) => response,
            Err(BackupError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let records: Option<Vec<PackageRecord>> =
            response.json().await.map_err(transport_error)?;
        Ok(records
            .unwrap_or_default()
            .into_iter()
            .map(Site::from)
            .collect())
    }

    async fn trigger_backup(
        &self,
        site: &Site,
        options: BackupOptions,
    ) -> Result<TriggerResult, BackupError> {
        let response = self
            .http
            .post(self.backup_endpoint(site))
            .header(AUTHORIZATION, &self.authorization)
            .json(&options)
            .send()
            .await
            .map_err(transport_error)?;
        let response = match check(response) {
            Ok(response) => response,
            Err(BackupError::RemoteRejected { status, .. }) => {
                return Ok(TriggerResult::Rejected(format!("HTTP {status}")));
            }
            Err(BackupError::NotFound(_)) => {
                return Ok(TriggerResult::Rejected("site not found".to_string()));
            }
            Err(e) => return Err(e),
        };
        let body: Option<Value> = response.json().await.map_err(transport_error)?;
        let acknowledged = body
            .as_ref()
            .and_then(|body| body.get("result"))
            .is_some_and(|result| !result.is_null());
        if acknowledged {
            Ok(TriggerResult::Accepted)
        } else {
            Ok(TriggerResult::Rejected(
                "provider did not acknowledge the backup request".to_string(),
            ))
        }
    }

    async fn backup_job(&self, site: &Site) -> Result<BackupJob, BackupError> {
        let response = self
            .http
            .get(self.backup_endpoint(site))
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check(response)?;
        let record: Option<Value> = response.json().await.map_err(transport_error)?;
        Ok(match record {
            Some(record) => job_from_record(site.id.clone(), &record),
            None => BackupJob::none(site.id.clone()),
        })
    }

    async fn download(&self, url: &str) -> Result<ByteStream, BackupError> {
        // download link は署名付き URL なので認証ヘッダは付けない
        let response = self
            .http
            .get(url)
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check(response)?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(transport_error))
            .boxed())
    }
}
