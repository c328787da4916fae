//! Downloader - リモートファイルをローカルにストリーム保存
//!
//! 1 ファイルの失敗は呼び出し側に値として返すだけで、兄弟のダウンロードは止めません。
//! 書き込みは `<name>.part` に行い、最後まで受信できたときだけ `<name>` に rename します。

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;

use crate::domain::{DownloadError, EntryId, RemoteEntry};
use crate::ports::RemoteStore;
use crate::retry::RetryPolicy;

pub struct Downloader<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: RemoteStore> Downloader<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Stream `file` into `dest`, replacing it only once every byte has arrived.
    ///
    /// Returns the number of bytes written. A retry starts over from an empty file.
    pub async fn download(&self, file: &EntryId, dest: &Path) -> Result<u64, DownloadError> {
        self.retry
            .run("download", move || self.download_once(file, dest))
            .await
    }

    /// Download `entry` into `dir` under its remote display name.
    pub async fn download_entry(
        &self,
        entry: &RemoteEntry,
        dir: &Path,
    ) -> Result<(PathBuf, u64), DownloadError> {
        let dest = local_path(dir, &entry.name)?;
        let written = self.download(&entry.id, &dest).await?;
        Ok((dest, written))
    }

    async fn download_once(&self, file: &EntryId, dest: &Path) -> Result<u64, DownloadError> {
        let part = part_path(dest);
        let written = match self.stream_to(file, &part).await {
            Ok(written) => written,
            Err(e) => {
                discard(&part).await;
                return Err(e);
            }
        };
        if let Err(source) = tokio::fs::rename(&part, dest).await {
            discard(&part).await;
            return Err(DownloadError::Persist {
                path: dest.to_path_buf(),
                source,
            });
        }
        Ok(written)
    }

    /// Write the remote content into `path`, creating or truncating it.
    async fn stream_to(&self, file: &EntryId, path: &Path) -> Result<u64, DownloadError> {
        let fetch_error = |source| DownloadError::Fetch {
            file: file.clone(),
            source,
        };
        let copy_error = |source| DownloadError::Copy {
            path: path.to_path_buf(),
            source,
        };

        let mut body = self.store.fetch(file).await.map_err(fetch_error)?;
        let mut out = tokio::fs::File::create(path)
            .await
            .map_err(|source| DownloadError::Create {
                path: path.to_path_buf(),
                source,
            })?;

        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await.map_err(fetch_error)? {
            out.write_all(&chunk).await.map_err(copy_error)?;
            written += chunk.len() as u64;
        }
        out.flush().await.map_err(copy_error)?;
        Ok(written)
    }
}

/// `a.log` -> `a.log.part`, next to `dest`.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn discard(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(error = %e, path = %part.display(), "unable to remove partial download");
    }
}

/// `dir/name`, as long as `name` is a single plain file name.
pub fn local_path(dir: &Path, name: &str) -> Result<PathBuf, DownloadError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(dir.join(part)),
        _ => Err(DownloadError::InvalidName(name.to_string())),
    }
}
