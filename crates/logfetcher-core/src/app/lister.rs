//! Lister - リモートフォルダの列挙
//!
//! - latest_child: 最も新しく作成された子を 1 件だけ取得
//! - all_children: 全ページを遅延ストリームとして列挙

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};

use crate::domain::{EntryId, FetchError, PageRequest, RemoteEntry};
use crate::ports::RemoteStore;
use crate::retry::RetryPolicy;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

enum Cursor {
    Start,
    Next(String),
    Done,
}

pub struct Lister<S> {
    store: Arc<S>,
    page_size: u32,
    retry: RetryPolicy,
}

impl<S: RemoteStore> Lister<S> {
    pub fn new(store: Arc<S>, page_size: u32, retry: RetryPolicy) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            retry,
        }
    }

    /// Most recently created child of `folder`, if it has any.
    pub async fn latest_child(
        &self,
        folder: &EntryId,
    ) -> Result<Option<RemoteEntry>, FetchError> {
        let page = self
            .retry
            .run("list latest child", move || {
                self.store.list_page(folder, PageRequest::first(1))
            })
            .await?;
        Ok(page.entries.into_iter().next())
    }

    /// Every child of `folder`, one page at a time.
    ///
    /// The stream is finite and starts from the first page each time this is
    /// called. Creation-time ordering is the remote's hint, not a guarantee.
    pub fn all_children<'a>(
        &'a self,
        folder: &'a EntryId,
    ) -> impl Stream<Item = Result<RemoteEntry, FetchError>> + Send + 'a {
        stream::try_unfold(Cursor::Start, move |cursor| async move {
            let page_token = match cursor {
                Cursor::Done => return Ok::<_, FetchError>(None),
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
            };
            let previous = page_token.clone();
            let request = PageRequest {
                page_size: self.page_size,
                page_token,
            };
            let page = self
                .retry
                .run("list folder", move || self.store.list_page(folder, request.clone()))
                .await?;

            let next = match page.next_page_token {
                // a repeated token would loop forever
                Some(token) if Some(&token) != previous.as_ref() => Cursor::Next(token),
                _ => Cursor::Done,
            };
            let entries = stream::iter(page.entries.into_iter().map(Ok::<_, FetchError>));
            Ok::<_, FetchError>(Some((entries, next)))
        })
        .try_flatten()
    }
}
