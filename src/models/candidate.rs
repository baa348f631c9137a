use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity of a title package as reported by the metadata reader.
///
/// `title_id` is an opaque, stable key; it is the primary key for the
/// cache, the queue, and every on-disk directory the installer creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMeta {
    pub title_id: String,
    pub title_name: String,
}

impl TitleMeta {
    pub fn new(title_id: impl Into<String>, title_name: impl Into<String>) -> Self {
        Self {
            title_id: title_id.into(),
            title_name: title_name.into(),
        }
    }
}

/// A discovered directory believed to contain an installable title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub meta: TitleMeta,
    pub discovered_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(path: PathBuf, meta: TitleMeta) -> Self {
        Self {
            path,
            meta,
            discovered_at: Utc::now(),
        }
    }

    pub fn title_id(&self) -> &str {
        &self.meta.title_id
    }

    pub fn title_name(&self) -> &str {
        &self.meta.title_name
    }
}
