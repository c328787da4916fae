//! RemoteEntry - リモートストレージ上のファイル/フォルダ
//!
//! リモート側が所有する読み取り専用のメタデータです。
//! このクレートは列挙とダウンロードにしか使いません。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Drive がフォルダに付ける MIME type
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Opaque locator of a remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// フォルダかファイルか（MIME type から判定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Folder,
    File,
}

impl EntryKind {
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else {
            EntryKind::File
        }
    }
}

/// A child listed from a remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: EntryId,
    pub name: String,
    pub mime_type: String,
    pub kind: EntryKind,

    /// Creation time reported by the remote. Only used as a sort hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn new(
        id: impl Into<EntryId>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        created_time: Option<DateTime<Utc>>,
    ) -> Self {
        let mime_type = mime_type.into();
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::from_mime_type(&mime_type),
            mime_type,
            created_time,
        }
    }

    /// Shorthand for a folder entry.
    pub fn folder(id: impl Into<EntryId>, name: impl Into<String>) -> Self {
        Self::new(id, name, FOLDER_MIME_TYPE, None)
    }

    /// Shorthand for a plain file entry.
    pub fn file(id: impl Into<EntryId>, name: impl Into<String>) -> Self {
        Self::new(id, name, "application/octet-stream", None)
    }

    pub fn with_created_time(mut self, created_time: DateTime<Utc>) -> Self {
        self.created_time = Some(created_time);
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPage {
    pub entries: Vec<RemoteEntry>,

    /// `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Request for a single listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: u32,
    pub page_token: Option<String>,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size,
            page_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_derived_from_mime_type() {
        assert!(RemoteEntry::folder("f1", "2024-05-01").is_folder());
        assert!(!RemoteEntry::file("a1", "a.log").is_folder());
        assert_eq!(
            RemoteEntry::new("x", "x.gz", "application/gzip", None).kind,
            EntryKind::File
        );
    }

    #[test]
    fn entry_id_serializes_as_plain_string() {
        let id = EntryId::new("1AbC");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1AbC\"");
        assert_eq!(id.to_string(), "1AbC");
    }
}
