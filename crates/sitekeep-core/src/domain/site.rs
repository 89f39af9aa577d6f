//! Site snapshot as listed by the hosting provider.

use serde::{Deserialize, Serialize};

use super::ids::SiteId;

/// A backup-eligible site. Fetched once per run and passed to each stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,

    /// Domain name, e.g. `example.com`.
    pub name: String,
}

impl Site {
    pub fn new(id: impl Into<SiteId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
