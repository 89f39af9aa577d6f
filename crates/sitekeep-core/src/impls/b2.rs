//! B2Client - Backblaze B2 native API (v2) に対する ObjectStore 実装
//!
//! # フロー
//! 1. `b2_authorize_account`（最初の呼び出し時に 1 回だけ。プロセス内でキャッシュ）
//! 2. bucket 名 → bucket id の解決（キーに bucket 制限があればそれを使う）
//! 3. list: `b2_list_file_names` を `nextFileName` でページング
//! 4. put: `b2_get_upload_url` → upload（1 リクエストで完結するので all-or-nothing）
//! 5. delete: `b2_list_file_versions` で同名の全バージョンを引き、`b2_delete_file_version`

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use super::http::{build_client, check, transport_error};
use crate::domain::{BackupError, RemoteObject};
use crate::ports::ObjectStore;

const LIST_PAGE_SIZE: u32 = 1000;

/// B2 wants file names URL-encoded with `/` left as is.
const FILE_NAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct B2Client {
    http: Client,
    api_base: String,
    account_id: String,
    application_key: String,
    bucket_name: String,
    transfer_timeout: Duration,
    session: OnceCell<B2Session>,
}

#[derive(Debug, Clone)]
struct B2Session {
    api_url: String,
    authorization_token: String,
    bucket_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    account_id: String,
    authorization_token: String,
    api_url: String,
    #[serde(default)]
    allowed: Option<Allowed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Allowed {
    bucket_id: Option<String>,
    bucket_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<BucketRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketRecord {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFilesResponse {
    files: Vec<FileRecord>,
    next_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRecord {
    file_id: String,
    file_name: String,
    content_length: u64,
    #[serde(default)]
    upload_timestamp: Option<i64>,
    #[serde(default)]
    action: Option<String>,
}

impl FileRecord {
    /// Hidden files, folder markers and unfinished large files are not objects.
    fn is_upload(&self) -> bool {
        self.action.as_deref().is_none_or(|action| action == "upload")
    }
}

impl From<FileRecord> for RemoteObject {
    fn from(file: FileRecord) -> Self {
        Self {
            key: file.file_name,
            size: file.content_length,
            uploaded_at: file.upload_timestamp.and_then(DateTime::<Utc>::from_timestamp_millis),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    content_length: u64,
}

impl B2Client {
    pub fn new(
        api_base: impl Into<String>,
        account_id: impl Into<String>,
        application_key: impl Into<String>,
        bucket_name: impl Into<String>,
        request_timeout: Duration,
        transfer_timeout: Duration,
    ) -> Result<Self, BackupError> {
        Ok(Self {
            http: build_client(request_timeout)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            application_key: application_key.into(),
            bucket_name: bucket_name.into(),
            transfer_timeout,
            session: OnceCell::new(),
        })
    }

    async fn session(&self) -> Result<&B2Session, BackupError> {
        self.session.get_or_try_init(|| self.authorize()).await
    }

    async fn authorize(&self) -> Result<B2Session, BackupError> {
        let url = format!("{}/b2api/v2/b2_authorize_account", self.api_base);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.account_id, Some(&self.application_key))
            .send()
            .await
            .map_err(transport_error)?;
        let auth: AuthorizeResponse = check(response)?.json().await.map_err(transport_error)?;

        let restricted = auth.allowed.and_then(|allowed| match allowed {
            Allowed {
                bucket_id: Some(id),
                bucket_name: Some(name),
            } if name == self.bucket_name => Some(id),
            _ => None,
        });
        let bucket_id = match restricted {
            Some(id) => id,
            None => {
                let listed: ListBucketsResponse = self
                    .call(
                        &auth.api_url,
                        &auth.authorization_token,
                        "b2_list_buckets",
                        &json!({"accountId": auth.account_id, "bucketName": self.bucket_name}),
                    )
                    .await?;
                listed
                    .buckets
                    .into_iter()
                    .find(|bucket| bucket.bucket_name == self.bucket_name)
                    .map(|bucket| bucket.bucket_id)
                    .ok_or_else(|| {
                        BackupError::Config(format!("bucket {} not found", self.bucket_name))
                    })?
            }
        };

        tracing::debug!(bucket = %self.bucket_name, "authorized with object storage");
        Ok(B2Session {
            api_url: auth.api_url,
            authorization_token: auth.authorization_token,
            bucket_id,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        api_url: &str,
        token: &str,
        operation: &str,
        body: &Value,
    ) -> Result<T, BackupError> {
        let url = format!("{api_url}/b2api/v2/{operation}");
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check(response)?.json().await.map_err(transport_error)
    }
}

fn encode_file_name(key: &str) -> String {
    utf8_percent_encode(key, FILE_NAME_SET).to_string()
}

#[async_trait]
impl ObjectStore for B2Client {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn list(&self) -> Result<Vec<RemoteObject>, BackupError> {
        let session = self.session().await?;
        let mut objects = Vec::new();
        let mut start_file_name: Option<String> = None;
        loop {
            let mut body = json!({
                "bucketId": session.bucket_id,
                "maxFileCount": LIST_PAGE_SIZE,
            });
            if let Some(start) = &start_file_name {
                body["startFileName"] = json!(start);
            }
            let page: ListFilesResponse = self
                .call(
                    &session.api_url,
                    &session.authorization_token,
                    "b2_list_file_names",
                    &body,
                )
                .await?;
            objects.extend(
                page.files
                    .into_iter()
                    .filter(FileRecord::is_upload)
                    .map(RemoteObject::from),
            );
            match page.next_file_name {
                Some(next) => start_file_name = Some(next),
                None => break,
            }
        }
        Ok(objects)
    }

    async fn put(&self, key: &str, path: &Path, size: u64) -> Result<u64, BackupError> {
        let session = self.session().await?;
        let target: UploadUrlResponse = self
            .call(
                &session.api_url,
                &session.authorization_token,
                "b2_get_upload_url",
                &json!({"bucketId": session.bucket_id}),
            )
            .await?;

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| BackupError::local_io(path, e))?;
        let response = self
            .http
            .post(&target.upload_url)
            .timeout(self.transfer_timeout)
            .header(AUTHORIZATION, &target.authorization_token)
            .header("X-Bz-File-Name", encode_file_name(key))
            .header(CONTENT_TYPE, "b2/x-auto")
            .header(CONTENT_LENGTH, size)
            // サイズ一致は呼び出し側で検証する
            .header("X-Bz-Content-Sha1", "do_not_verify")
            .body(reqwest::Body::from(file))
            .send()
            .await
            .map_err(transport_error)?;
        let uploaded: UploadResponse = check(response)?.json().await.map_err(transport_error)?;
        Ok(uploaded.content_length)
    }

    async fn delete(&self, key: &str) -> Result<bool, BackupError> {
        let session = self.session().await?;
        let versions: ListFilesResponse = self
            .call(
                &session.api_url,
                &session.authorization_token,
                "b2_list_file_versions",
                &json!({
                    "bucketId": session.bucket_id,
                    "startFileName": key,
                    "prefix": key,
                    "maxFileCount": LIST_PAGE_SIZE,
                }),
            )
            .await?;

        let mut deleted = false;
        for version in versions.files.iter().filter(|file| file.file_name == key) {
            let _: Value = self
                .call(
                    &session.api_url,
                    &session.authorization_token,
                    "b2_delete_file_version",
                    &json!({"fileName": version.file_name, "fileId": version.file_id}),
                )
                .await?;
            deleted = true;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_names_keep_slashes() {
        assert_eq!(
            encode_file_name("01-02-2024/a.com_01-02-2024-00-00-00.zip"),
            "01-02-2024/a.com_01-02-2024-00-00-00.zip"
        );
        assert_eq!(encode_file_name("x/my site.zip"), "x/my%20site.zip");
    }

    #[test]
    fn listing_pages_decode_and_skip_non_uploads() {
        let page: ListFilesResponse = serde_json::from_value(json!({
            "files": [
                {"fileId": "f1", "fileName": "01-01-2024/a.zip", "contentLength": 12,
                 "uploadTimestamp": 1704067200000_i64, "action": "upload"},
                {"fileId": "f2", "fileName": "01-01-2024/b.zip", "contentLength": 0,
                 "action": "hide"},
                {"fileId": "f3", "fileName": "01-01-2024/", "contentLength": 0,
                 "action": "folder"}
            ],
            "nextFileName": "01-01-2024/c.zip"
        }))
        .unwrap();
        assert_eq!(page.next_file_name.as_deref(), Some("01-01-2024/c.zip"));

        let objects: Vec<RemoteObject> = page
            .files
            .into_iter()
            .filter(FileRecord::is_upload)
            .map(RemoteObject::from)
            .collect();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "01-01-2024/a.zip");
        assert_eq!(objects[0].size, 12);
        assert_eq!(
            objects[0].uploaded_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn restricted_key_names_its_bucket() {
        let auth: AuthorizeResponse = serde_json::from_value(json!({
            "accountId": "acc",
            "authorizationToken": "tok",
            "apiUrl": "https://api000.example",
            "allowed": {"bucketId": "b-1", "bucketName": "site-backups", "capabilities": []}
        }))
        .unwrap();
        let allowed = auth.allowed.unwrap();
        assert_eq!(allowed.bucket_id.as_deref(), Some("b-1"));
        assert_eq!(allowed.bucket_name.as_deref(), Some("site-backups"));
    }
}
