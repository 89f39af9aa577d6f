//! RemoteSiteDirectory - ホスティング上のサイト一覧
//!
//! 除外設定されたサイトを落とし、同じ id が複数返ってきた場合は最初の1件だけ残す。

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{BackupError, Site};
use crate::ports::HostingApi;

pub struct RemoteSiteDirectory {
    api: Arc<dyn HostingApi>,
    excluded_site: Option<String>,
}

impl RemoteSiteDirectory {
    pub fn new(api: Arc<dyn HostingApi>, excluded_site: Option<String>) -> Self {
        Self { api, excluded_site }
    }

    /// Domain names compare case-insensitively.
    pub fn is_excluded(&self, site: &Site) -> bool {
        self.excluded_site
            .as_deref()
            .is_some_and(|excluded| excluded.eq_ignore_ascii_case(&site.name))
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, BackupError> {
        let listed = self.api.list_sites().await?;
        let listed_count = listed.len();

        let mut seen = HashSet::new();
        let sites: Vec<Site> = listed
            .into_iter()
            .filter(|site| {
                if self.is_excluded(site) {
                    debug!(site = %site.name, "site excluded by configuration");
                    return false;
                }
                if !seen.insert(site.id.clone()) {
                    debug!(site_id = %site.id, site = %site.name, "duplicate site id ignored");
                    return false;
                }
                true
            })
            .collect();

        info!(listed = listed_count, eligible = sites.len(), "discovered sites");
        Ok(sites)
    }
}
