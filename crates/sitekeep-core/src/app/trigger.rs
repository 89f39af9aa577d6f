//! BackupJobTrigger - サーバー側バックアップの開始要求

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{BackupError, BackupOptions, Site, TriggerResult};
use crate::ports::HostingApi;

pub struct BackupJobTrigger {
    api: Arc<dyn HostingApi>,
}

impl BackupJobTrigger {
    pub fn new(api: Arc<dyn HostingApi>) -> Self {
        Self { api }
    }

    /// Fire-and-forget: acceptance does not mean the backup has finished.
    /// Repeated triggers for the same site are passed through as-is.
    pub async fn trigger(
        &self,
        site: &Site,
        options: BackupOptions,
    ) -> Result<TriggerResult, BackupError> {
        info!(
            site_id = %site.id,
            site = %site.name,
            files = options.files,
            databases = options.databases,
            "requesting backup"
        );
        let result = self.api.trigger_backup(site, options).await?;
        match &result {
            TriggerResult::Accepted => info!("backup scheduled"),
            TriggerResult::Rejected(reason) => warn!(%reason, "backup request rejected"),
        }
        Ok(result)
    }
}
