//! InMemoryRemoteStore - 開発用・テスト用のリモートストア
//!
//! # 実装詳細
//! - HashMap<EntryId, Vec<RemoteEntry>> でフォルダごとの子を管理
//! - page token はオフセットの文字列
//! - 構築後は不変（builder メソッドで組み立ててから共有する）

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::domain::{EntryId, EntryPage, FetchError, PageRequest, RemoteEntry};
use crate::ports::{ByteStream, RemoteStore};

const DEFAULT_CHUNK_SIZE: usize = 4;

/// # 使用例
/// ```ignore
/// let store = InMemoryRemoteStore::new()
///     .with_entry("root", RemoteEntry::folder("d1", "2024-05-01"))
///     .with_file("d1", RemoteEntry::file("a1", "a.log"), "hello");
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryRemoteStore {
    children: HashMap<EntryId, Vec<RemoteEntry>>,
    contents: HashMap<EntryId, Bytes>,
    failing_listings: HashMap<EntryId, FetchError>,
    failing_fetches: HashMap<EntryId, FetchError>,
    interrupted_fetches: HashMap<EntryId, FetchError>,
    chunk_size: usize,
    list_calls: Arc<AtomicUsize>,
    fetch_calls: Arc<AtomicUsize>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            contents: HashMap::new(),
            failing_listings: HashMap::new(),
            failing_fetches: HashMap::new(),
            interrupted_fetches: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            list_calls: Arc::new(AtomicUsize::new(0)),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add `entry` as a child of `parent`.
    pub fn with_entry(mut self, parent: impl Into<EntryId>, entry: RemoteEntry) -> Self {
        self.children.entry(parent.into()).or_default().push(entry);
        self
    }

    /// Add a file child of `parent` with the given content.
    pub fn with_file(
        mut self,
        parent: impl Into<EntryId>,
        entry: RemoteEntry,
        content: impl Into<Bytes>,
    ) -> Self {
        self.contents.insert(entry.id.clone(), content.into());
        self.with_entry(parent, entry)
    }

    /// Make every listing of `folder` fail with `err`.
    pub fn with_failing_listing(mut self, folder: impl Into<EntryId>, err: FetchError) -> Self {
        self.failing_listings.insert(folder.into(), err);
        self
    }

    /// Make every fetch of `file` fail with `err`.
    pub fn with_failing_fetch(mut self, file: impl Into<EntryId>, err: FetchError) -> Self {
        self.failing_fetches.insert(file.into(), err);
        self
    }

    /// Stream the content of `file`, then fail with `err` instead of ending.
    pub fn with_interrupted_fetch(mut self, file: impl Into<EntryId>, err: FetchError) -> Self {
        self.interrupted_fetches.insert(file.into(), err);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn sorted_children(&self, folder: &EntryId) -> Vec<RemoteEntry> {
        let mut children = self.children.get(folder).cloned().unwrap_or_default();
        // newest first, undated last
        children.sort_by(|a, b| b.created_time.cmp(&a.created_time));
        children
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn list_page(
        &self,
        folder: &EntryId,
        page: PageRequest,
    ) -> Result<EntryPage, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failing_listings.get(folder) {
            return Err(err.clone());
        }

        let children = self.sorted_children(folder);
        let offset = match page.page_token.as_deref() {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| FetchError::Decode(format!("bad page token {token:?}")))?,
        };
        let size = page.page_size.max(1) as usize;
        let end = offset.saturating_add(size).min(children.len());
        let entries = children.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < children.len()).then(|| end.to_string());

        Ok(EntryPage {
            entries,
            next_page_token,
        })
    }

    async fn fetch(&self, file: &EntryId) -> Result<ByteStream, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failing_fetches.get(file) {
            return Err(err.clone());
        }
        let content = self
            .contents
            .get(file)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("file {file}")))?;

        let mut chunks: Vec<Result<Bytes, FetchError>> = content
            .chunks(self.chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if let Some(err) = self.interrupted_fetches.get(file) {
            chunks.push(Err(err.clone()));
        }
        Ok(stream::iter(chunks).boxed())
    }
}
