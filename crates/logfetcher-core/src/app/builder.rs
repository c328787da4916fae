//! AppBuilder - Orchestrator の組み立て
//!
//! RemoteStore・Clock・保持期間などを受け取り、Lister / Downloader / RetentionSweeper を
//! 配線した Orchestrator を返します。設定の不備は `build()` で BuildError になります。

use std::path::PathBuf;
use std::sync::Arc;

use super::downloader::Downloader;
use super::lister::{DEFAULT_PAGE_SIZE, Lister};
use super::orchestrator::Orchestrator;
use super::sweeper::RetentionSweeper;
use crate::config::Config;
use crate::domain::{EntryId, Phase, RetentionInterval};
use crate::ports::{Clock, RemoteStore, SystemClock};
use crate::retry::RetryPolicy;

pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

/// AppBuilder は Orchestrator を構築
///
/// # 使用例
/// ```ignore
/// let orchestrator = AppBuilder::new(Arc::new(store))
///     .root_folder("1AbCdEf")
///     .local_root("/var/log/archive")
///     .retention(RetentionInterval::Days14)
///     .skip_first_download(true)
///     .build()?;
/// ```
///
/// `root_folder` は必須です。`local_root` は既存のディレクトリでなければなりません。
pub struct AppBuilder<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    root_folder: Option<EntryId>,
    local_root: PathBuf,
    retention: RetentionInterval,
    reserved: Vec<String>,
    retry: RetryPolicy,
    page_size: u32,
    download_concurrency: usize,
    skip_first_download: bool,
    dry_run_sweep: bool,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("root folder id is not set")]
    MissingRootFolder,

    #[error("local root {} is not an existing directory", .0.display())]
    LocalRootNotDirectory(PathBuf),

    #[error("download concurrency must be at least 1")]
    ZeroConcurrency,
}

impl<S: RemoteStore> AppBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: SystemClock,
            root_folder: None,
            local_root: PathBuf::from("."),
            retention: RetentionInterval::default(),
            reserved: Vec::new(),
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            skip_first_download: false,
            dry_run_sweep: false,
        }
    }
}

impl<S: RemoteStore, C: Clock> AppBuilder<S, C> {
    pub fn clock<C2: Clock>(self, clock: C2) -> AppBuilder<S, C2> {
        AppBuilder {
            store: self.store,
            clock,
            root_folder: self.root_folder,
            local_root: self.local_root,
            retention: self.retention,
            reserved: self.reserved,
            retry: self.retry,
            page_size: self.page_size,
            download_concurrency: self.download_concurrency,
            skip_first_download: self.skip_first_download,
            dry_run_sweep: self.dry_run_sweep,
        }
    }

    /// Take every setting from a validated [`Config`].
    pub fn config(self, config: &Config) -> Self {
        self.root_folder(config.folder_id.clone())
            .local_root(config.local_root.clone())
            .retention(config.retention)
            .reserved(config.reserved_names())
            .retry(config.retry_policy())
            .page_size(config.page_size)
            .download_concurrency(config.download_concurrency)
            .dry_run_sweep(config.dry_run_sweep)
    }

    pub fn root_folder(mut self, id: impl Into<EntryId>) -> Self {
        self.root_folder = Some(id.into());
        self
    }

    /// Mirror root and sweep root.
    pub fn local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = root.into();
        self
    }

    pub fn retention(mut self, retention: RetentionInterval) -> Self {
        self.retention = retention;
        self
    }

    /// Names under the local root that the sweep must never touch.
    pub fn reserved<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn download_concurrency(mut self, n: usize) -> Self {
        self.download_concurrency = n;
        self
    }

    /// Start in [`Phase::Bootstrapping`]: the first tick lists without downloading.
    pub fn skip_first_download(mut self, skip: bool) -> Self {
        self.skip_first_download = skip;
        self
    }

    pub fn dry_run_sweep(mut self, dry_run: bool) -> Self {
        self.dry_run_sweep = dry_run;
        self
    }

    /// 検証して Orchestrator を生成
    pub fn build(self) -> Result<Orchestrator<S, C>, BuildError> {
        let root_folder = self
            .root_folder
            .filter(|id| !id.as_str().trim().is_empty())
            .ok_or(BuildError::MissingRootFolder)?;
        if !self.local_root.is_dir() {
            return Err(BuildError::LocalRootNotDirectory(self.local_root));
        }
        if self.download_concurrency == 0 {
            return Err(BuildError::ZeroConcurrency);
        }

        let sweeper = RetentionSweeper::new(self.local_root.clone(), self.retention)
            .with_reserved(self.reserved)
            .with_dry_run(self.dry_run_sweep);
        let phase = Phase::initial(self.skip_first_download);
        tracing::debug!(
            root = %root_folder,
            local_root = %self.local_root.display(),
            retention = %self.retention,
            %phase,
            "orchestrator built"
        );

        Ok(Orchestrator {
            root_folder,
            local_root: self.local_root,
            lister: Lister::new(self.store.clone(), self.page_size, self.retry.clone()),
            downloader: Downloader::new(self.store, self.retry),
            sweeper,
            clock: self.clock,
            phase,
            download_concurrency: self.download_concurrency,
        })
    }
}
