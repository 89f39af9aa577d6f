//! Config - 実行設定
//!
//! # 読み込み順
//! 1. 既定値
//! 2. TOML ファイル（指定された場合）
//! 3. 環境変数 `SITEKEEP_*`
//!
//! 最後に `validate()` で Fail-fast 検証する。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::domain::{BackupError, BackupOptions, DefaultDecider, RetryPolicy};
use crate::impls::{B2Client, TwentyIClient};

pub const ENV_PREFIX: &str = "SITEKEEP_";

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api_base: String,
    pub bearer_token: String,
    pub excluded_site: Option<String>,
    pub retention_days: u32,
    pub backup_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub concurrency: usize,
    pub backup: BackupOptions,
    pub storage: StorageConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub api_base: String,
    pub account_id: String,
    pub application_key: String,
    pub bucket: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "https://api.20i.com".to_string(),
            bearer_token: String::new(),
            excluded_site: None,
            retention_days: 30,
            backup_dir: PathBuf::from("./backups"),
            request_timeout_secs: 30,
            transfer_timeout_secs: 3600,
            max_attempts: 3,
            retry_base_delay_ms: 2000,
            concurrency: 1,
            backup: BackupOptions::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.backblazeb2.com".to_string(),
            account_id: String::new(),
            application_key: String::new(),
            bucket: String::new(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, apply `SITEKEEP_*` environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, BackupError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    BackupError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, BackupError> {
        toml::from_str(raw).map_err(|e| BackupError::Config(e.to_string()))
    }

    /// `lookup` receives the full variable name, e.g. `SITEKEEP_BUCKET`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), BackupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.trim().is_empty())
        };

        if let Some(v) = var("API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = var("BEARER_TOKEN") {
            self.bearer_token = v;
        }
        if let Some(v) = var("EXCLUDED_SITE") {
            self.excluded_site = Some(v);
        }
        if let Some(v) = var("BACKUP_DIR") {
            self.backup_dir = PathBuf::from(v);
        }
        if let Some(v) = var("RETENTION_DAYS") {
            self.retention_days = parse_var("RETENTION_DAYS", &v)?;
        }
        if let Some(v) = var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("TRANSFER_TIMEOUT_SECS") {
            self.transfer_timeout_secs = parse_var("TRANSFER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("MAX_ATTEMPTS") {
            self.max_attempts = parse_var("MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("RETRY_BASE_DELAY_MS") {
            self.retry_base_delay_ms = parse_var("RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = var("CONCURRENCY") {
            self.concurrency = parse_var("CONCURRENCY", &v)?;
        }
        if let Some(v) = var("BACKUP_FILES") {
            self.backup.files = parse_var("BACKUP_FILES", &v)?;
        }
        if let Some(v) = var("BACKUP_DATABASES") {
            self.backup.databases = parse_var("BACKUP_DATABASES", &v)?;
        }
        if let Some(v) = var("STORAGE_API_BASE") {
            self.storage.api_base = v;
        }
        if let Some(v) = var("STORAGE_ACCOUNT_ID") {
            self.storage.account_id = v;
        }
        if let Some(v) = var("STORAGE_APPLICATION_KEY") {
            self.storage.application_key = v;
        }
        if let Some(v) = var("STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BackupError> {
        let required = [
            ("bearer_token", &self.bearer_token),
            ("storage.account_id", &self.storage.account_id),
            ("storage.application_key", &self.storage.application_key),
            ("storage.bucket", &self.storage.bucket),
            ("api_base", &self.api_base),
            ("storage.api_base", &self.storage.api_base),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(BackupError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        if self.concurrency == 0 {
            return Err(BackupError::Config("concurrency must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(BackupError::Config("max_attempts must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 || self.transfer_timeout_secs == 0 {
            return Err(BackupError::Config("timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.retention_days))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn decider(&self) -> DefaultDecider {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        };
        DefaultDecider::new(policy, self.max_attempts)
    }

    pub fn hosting_client(&self) -> Result<TwentyIClient, BackupError> {
        TwentyIClient::new(
            self.api_base.as_str(),
            &self.bearer_token,
            self.request_timeout(),
            self.transfer_timeout(),
        )
    }

    pub fn storage_client(&self) -> Result<B2Client, BackupError> {
        B2Client::new(
            self.storage.api_base.as_str(),
            self.storage.account_id.as_str(),
            self.storage.application_key.as_str(),
            self.storage.bucket.as_str(),
            self.request_timeout(),
            self.transfer_timeout(),
        )
    }
}

fn parse_var<T: FromStr>(suffix: &str, raw: &str) -> Result<T, BackupError>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| BackupError::Config(format!("invalid {ENV_PREFIX}{suffix}={raw:?}: {e}")))
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_base", &self.api_base)
            .field("bearer_token", &REDACTED)
            .field("excluded_site", &self.excluded_site)
            .field("retention_days", &self.retention_days)
            .field("backup_dir", &self.backup_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("transfer_timeout_secs", &self.transfer_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("concurrency", &self.concurrency)
            .field("backup", &self.backup)
            .field("storage", &self.storage)
            .finish()
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id)
            .field("application_key", &REDACTED)
            .field("bucket", &self.bucket)
            .finish()
    }
}
