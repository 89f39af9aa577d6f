//! Objects in cold storage.
//!
//! Keys are `<dd-mm-YYYY>/<file name>`, where the folder is the date the
//! artifact was transferred. The retention sweep reads the age back from that
//! folder, so anything that does not follow the layout is left alone.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const FOLDER_DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            uploaded_at: None,
        }
    }

    /// `(folder date, file name)` if the key follows the `date/filename` layout.
    pub fn dated_path(&self) -> Option<(NaiveDate, &str)> {
        parse_object_key(&self.key)
    }
}

pub fn object_key(run_date: NaiveDate, file_name: &str) -> String {
    format!("{}/{file_name}", run_date.format(FOLDER_DATE_FORMAT))
}

pub fn parse_object_key(key: &str) -> Option<(NaiveDate, &str)> {
    let (folder, file_name) = key.split_once('/')?;
    if file_name.is_empty() || file_name.contains('/') {
        return None;
    }
    let date = NaiveDate::parse_from_str(folder, FOLDER_DATE_FORMAT).ok()?;
    Some((date, file_name))
}

/// File names already present in cold storage, with every copy's key and size.
///
/// Listed once per `download` run. A copy only counts as a confirmed upload of
/// a local file when its size equals the local size; a truncated copy left by
/// a failed upload does not.
#[derive(Debug, Clone, Default)]
pub struct ArchivedNames {
    by_file_name: HashMap<String, Vec<RemoteObject>>,
}

impl ArchivedNames {
    pub fn from_objects(objects: &[RemoteObject]) -> Self {
        let mut by_file_name: HashMap<String, Vec<RemoteObject>> = HashMap::new();
        for object in objects {
            if let Some((_, file_name)) = object.dated_path() {
                by_file_name
                    .entry(file_name.to_string())
                    .or_default()
                    .push(object.clone());
            }
        }
        Self { by_file_name }
    }

    /// Key of any copy of `file_name`, whatever its size.
    pub fn key_for(&self, file_name: &str) -> Option<&str> {
        self.by_file_name
            .get(file_name)
            .and_then(|copies| copies.first())
            .map(|object| object.key.as_str())
    }

    /// Key of a copy of `file_name` whose size is exactly `size`.
    pub fn confirmed_copy(&self, file_name: &str, size: u64) -> Option<&str> {
        self.by_file_name
            .get(file_name)?
            .iter()
            .find(|object| object.size == size)
            .map(|object| object.key.as_str())
    }
}
