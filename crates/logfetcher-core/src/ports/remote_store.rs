//! RemoteStore port - リモートストレージ（Google Drive または InMemory）
//!
//! コアが必要とするのは次の 2 つだけです。
//! - フォルダ F の子を新しい順にページ単位で列挙する
//! - locator からファイルのバイト列を取得する

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::domain::{EntryId, EntryPage, FetchError, PageRequest};

/// Chunks of a remote object, in order.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// RemoteStore はリモートのフォルダ列挙とファイル取得を提供
///
/// # 設計原則
/// - 並び順（作成日時の降順）はリモート側のヒントであり、全順序は保証しない
/// - fetch は全体をメモリに載せずにストリームで返す
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List one page of `folder`'s children, newest first.
    async fn list_page(&self, folder: &EntryId, page: PageRequest)
    -> Result<EntryPage, FetchError>;

    /// Open the content of `file` as a byte stream.
    async fn fetch(&self, file: &EntryId) -> Result<ByteStream, FetchError>;
}
