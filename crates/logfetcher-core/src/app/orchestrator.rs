//! Orchestrator - 1 tick の実行
//!
//! # フロー
//! 1. Lister::latest_child() でルート直下の最新フォルダを取得
//! 2. bootstrapping なら列挙だけして終了（ファイルは書かない）
//! 3. steady ならフォルダを作成し、フォルダ以外の子をすべてダウンロード
//! 4. RetentionSweeper::sweep() で期限切れを削除
//!
//! ルートの列挙失敗だけが tick を中断します。それ以外はログに残して続行します。

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt};

use super::downloader::{Downloader, local_path};
use super::lister::Lister;
use super::sweeper::RetentionSweeper;
use crate::domain::{EntryId, FetchError, Phase, RemoteEntry, TickError};
use crate::observability::{SweepReport, TickReport};
use crate::ports::{Clock, RemoteStore, SystemClock};

pub struct Orchestrator<S, C = SystemClock> {
    pub(crate) root_folder: EntryId,
    pub(crate) local_root: PathBuf,
    pub(crate) lister: Lister<S>,
    pub(crate) downloader: Downloader<S>,
    pub(crate) sweeper: RetentionSweeper,
    pub(crate) clock: C,
    pub(crate) phase: Phase,
    pub(crate) download_concurrency: usize,
}

impl<S: RemoteStore, C: Clock> Orchestrator<S, C> {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn root_folder(&self) -> &EntryId {
        &self.root_folder
    }

    /// Run one listing / download / sweep cycle.
    pub async fn tick(&mut self) -> Result<TickReport, TickError> {
        let phase = self.phase;
        let mut report = TickReport::new(phase);

        let latest = self.lister.latest_child(&self.root_folder).await;
        // leaves bootstrapping whether or not the listing worked
        self.phase = phase.after_listing();
        let latest = latest.map_err(|source| TickError::Listing {
            folder: self.root_folder.clone(),
            source,
        })?;

        match latest {
            None => tracing::info!(root = %self.root_folder, "no folders found"),
            Some(folder) if !phase.downloads_enabled() => {
                self.index(&folder, &mut report).await;
                return Ok(report);
            }
            Some(folder) => self.mirror(&folder, &mut report).await,
        }

        if phase.downloads_enabled() {
            report.sweep = self.sweep().await;
        }
        Ok(report)
    }

    /// Bootstrapping: list the latest folder without touching the disk.
    async fn index(&self, folder: &RemoteEntry, report: &mut TickReport) {
        report.folder = Some(folder.name.clone());
        match self.list_folder(folder).await {
            Ok(children) => {
                report.listed = children.len();
                tracing::info!(
                    folder = %folder.name,
                    listed = children.len(),
                    "indexed existing remote state, downloads skipped on first run"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, folder = %folder.name, "unable to index folder");
            }
        }
    }

    /// Steady: download every non-folder child of `folder` into a local
    /// directory of the same name.
    async fn mirror(&self, folder: &RemoteEntry, report: &mut TickReport) {
        if !folder.is_folder() {
            tracing::warn!(
                entry = %folder.name,
                mime_type = %folder.mime_type,
                "latest entry under the root is not a folder, nothing to mirror"
            );
            return;
        }
        report.folder = Some(folder.name.clone());

        let dir = match local_path(&self.local_root, &folder.name) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(error = %e, "skipping folder");
                return;
            }
        };
        if let Err(e) = ensure_dir(&dir).await {
            tracing::warn!(
                error = %e,
                dir = %dir.display(),
                "unable to create local folder, skipping"
            );
            return;
        }

        let children = match self.list_folder(folder).await {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    folder = %folder.name,
                    "unable to list folder, skipping"
                );
                return;
            }
        };
        report.listed = children.len();

        let (folders, files): (Vec<_>, Vec<_>) =
            children.into_iter().partition(RemoteEntry::is_folder);
        report.skipped_folders = folders.len();
        for skipped in &folders {
            tracing::debug!(entry = %skipped.name, "not descending into nested folder");
        }

        // 同名ファイルは同じローカルパスに書くので 1 件に絞る
        let (files, duplicates) = newest_per_name(files);
        report.skipped_duplicates = duplicates.len();
        for duplicate in &duplicates {
            tracing::warn!(
                file = %duplicate.name,
                id = %duplicate.id,
                "another file with the same name is newer, skipping"
            );
        }

        let results: Vec<_> = futures::stream::iter(files)
            .map(|entry| self.download_logged(entry, &dir))
            .buffer_unordered(self.download_concurrency.max(1))
            .collect()
            .await;

        for written in results {
            match written {
                Some(bytes) => {
                    report.downloaded += 1;
                    report.bytes_written += bytes;
                }
                None => report.failed += 1,
            }
        }
        tracing::info!(
            folder = %folder.name,
            downloaded = report.downloaded,
            failed = report.failed,
            skipped_folders = report.skipped_folders,
            skipped_duplicates = report.skipped_duplicates,
            bytes = report.bytes_written,
            "folder mirrored"
        );
    }

    async fn download_logged(&self, entry: RemoteEntry, dir: &Path) -> Option<u64> {
        match self.downloader.download_entry(&entry, dir).await {
            Ok((path, bytes)) => {
                tracing::info!(file = %entry.name, path = %path.display(), bytes, "downloaded");
                Some(bytes)
            }
            Err(e) => {
                tracing::warn!(error = %e, file = %entry.name, id = %entry.id, "download failed");
                None
            }
        }
    }

    async fn list_folder(&self, folder: &RemoteEntry) -> Result<Vec<RemoteEntry>, FetchError> {
        self.lister.all_children(&folder.id).try_collect().await
    }

    async fn sweep(&self) -> Option<SweepReport> {
        match self.sweeper.sweep(self.clock.now()).await {
            Ok(report) => {
                tracing::info!(
                    interval = %self.sweeper.interval(),
                    deleted = report.deleted.len(),
                    kept = report.kept,
                    failed = report.failed,
                    "retention sweep complete"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    root = %self.sweeper.root().display(),
                    "retention sweep failed"
                );
                None
            }
        }
    }
}

/// Split `files` into one entry per name (the most recently created one,
/// the first listed on a tie) and the rest.
fn newest_per_name(files: Vec<RemoteEntry>) -> (Vec<RemoteEntry>, Vec<RemoteEntry>) {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<RemoteEntry> = Vec::with_capacity(files.len());
    let mut duplicates = Vec::new();

    for entry in files {
        match index.get(&entry.name) {
            None => {
                index.insert(entry.name.clone(), unique.len());
                unique.push(entry);
            }
            Some(&i) if entry.created_time > unique[i].created_time => {
                duplicates.push(std::mem::replace(&mut unique[i], entry));
            }
            Some(_) => duplicates.push(entry),
        }
    }
    (unique, duplicates)
}

/// Create `dir`; an existing directory is fine.
async fn ensure_dir(dir: &Path) -> io::Result<()> {
    match tokio::fs::create_dir(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if tokio::fs::metadata(dir).await?.is_dir() {
                tracing::debug!(dir = %dir.display(), "folder already exists");
                Ok(())
            } else {
                Err(e)
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppBuilder;
    use crate::domain::RetentionInterval;
    use crate::impls::InMemoryRemoteStore;
    use crate::ports::FixedClock;
    use crate::retry::RetryPolicy;
    use chrono::{DateTime, TimeZone, Utc};
    use std::fs;
    use std::sync::Arc;

    // 2024-05-03 03:00 at +07:00, cutoff 2024-04-25
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 20, 0, 0).unwrap()
    }

    /// root
    /// ├── 2024-04-30/ (older)
    /// └── 2024-05-01/
    ///     ├── a.log
    ///     ├── b.log
    ///     └── sub/
    ///         └── c.log
    fn remote() -> InMemoryRemoteStore {
        let created = |day| Utc.with_ymd_and_hms(2024, 4, day, 18, 30, 0).unwrap();
        InMemoryRemoteStore::new()
            .with_entry(
                "root",
                RemoteEntry::folder("old", "2024-04-30").with_created_time(created(29)),
            )
            .with_entry(
                "root",
                RemoteEntry::folder("d1", "2024-05-01").with_created_time(created(30)),
            )
            .with_file("old", RemoteEntry::file("o1", "old.log"), "old")
            .with_file("d1", RemoteEntry::file("a1", "a.log"), "aaaa")
            .with_file("d1", RemoteEntry::file("b1", "b.log"), "bb")
            .with_entry("d1", RemoteEntry::folder("s1", "sub"))
            .with_file("s1", RemoteEntry::file("c1", "c.log"), "c")
    }

    fn orchestrator(
        store: InMemoryRemoteStore,
        root: &Path,
        skip_first_download: bool,
    ) -> (Arc<InMemoryRemoteStore>, Orchestrator<InMemoryRemoteStore, FixedClock>) {
        let store = Arc::new(store);
        let orchestrator = AppBuilder::new(store.clone())
            .clock(FixedClock::new(now()))
            .root_folder("root")
            .local_root(root)
            .retention(RetentionInterval::Days7)
            .retry(RetryPolicy::none())
            .skip_first_download(skip_first_download)
            .build()
            .unwrap();
        (store, orchestrator)
    }

    fn dir_names(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn steady_tick_mirrors_latest_folder_one_level_deep() {
        let root = tempfile::tempdir().unwrap();
        let (_, mut orchestrator) = orchestrator(remote(), root.path(), false);

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.phase, Phase::Steady);
        assert_eq!(report.folder.as_deref(), Some("2024-05-01"));
        assert_eq!(report.listed, 3);
        assert_eq!(report.downloaded, 2);
        assert_eq!(report.skipped_folders, 1);
        assert_eq!(report.bytes_written, 6);
        assert_eq!(dir_names(root.path()), ["2024-05-01"]);
        assert_eq!(dir_names(&root.path().join("2024-05-01")), ["a.log", "b.log"]);
        assert_eq!(fs::read_to_string(root.path().join("2024-05-01/a.log")).unwrap(), "aaaa");
    }

    #[tokio::test]
    async fn bootstrapping_tick_lists_but_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let (store, mut orchestrator) = orchestrator(remote(), root.path(), true);
        assert_eq!(orchestrator.phase(), Phase::Bootstrapping);

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.phase, Phase::Bootstrapping);
        assert_eq!(report.listed, 3);
        assert_eq!(report.downloaded, 0);
        assert!(report.sweep.is_none());
        assert!(store.list_calls() >= 1);
        assert_eq!(store.fetch_calls(), 0);
        assert!(dir_names(root.path()).is_empty());
        assert_eq!(orchestrator.phase(), Phase::Steady);

        // next tick with the same remote state downloads everything
        let report = orchestrator.tick().await.unwrap();
        assert_eq!(report.phase, Phase::Steady);
        assert_eq!(report.downloaded, 2);
        assert_eq!(dir_names(&root.path().join("2024-05-01")), ["a.log", "b.log"]);
    }

    #[tokio::test]
    async fn root_listing_failure_aborts_tick_but_leaves_bootstrapping() {
        let root = tempfile::tempdir().unwrap();
        let store = remote()
            .with_failing_listing("root", FetchError::Unauthorized("token revoked".into()));
        let (_, mut orchestrator) = orchestrator(store, root.path(), true);

        let err = orchestrator.tick().await.unwrap_err();

        assert!(matches!(err, TickError::Listing { .. }));
        assert!(err.to_string().contains("token revoked"));
        assert_eq!(orchestrator.phase(), Phase::Steady);
    }

    #[tokio::test]
    async fn subfolder_listing_failure_still_sweeps() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("2024-04-01")).unwrap();
        fs::create_dir(root.path().join("2024-04-30")).unwrap();
        let store = remote()
            .with_failing_listing("d1", FetchError::NotFound("folder d1".into()));
        let (_, mut orchestrator) = orchestrator(store, root.path(), false);

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.downloaded, 0);
        let sweep = report.sweep.unwrap();
        assert_eq!(sweep.deleted, ["2024-04-01"]);
        assert_eq!(dir_names(root.path()), ["2024-04-30", "2024-05-01"]);
    }

    #[tokio::test]
    async fn one_failed_download_does_not_block_siblings() {
        let root = tempfile::tempdir().unwrap();
        let store = remote()
            .with_failing_fetch("a1", FetchError::Transport("connection reset".into()));
        let (_, mut orchestrator) = orchestrator(store, root.path(), false);

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(dir_names(&root.path().join("2024-05-01")), ["b.log"]);
    }

    #[tokio::test]
    async fn same_named_files_are_written_once() {
        let root = tempfile::tempdir().unwrap();
        let at = |hour| Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
        let store = InMemoryRemoteStore::new()
            .with_entry("root", RemoteEntry::folder("d1", "2024-05-01"))
            .with_file(
                "d1",
                RemoteEntry::file("a1", "a.log").with_created_time(at(10)),
                "A".repeat(4000),
            )
            .with_file(
                "d1",
                RemoteEntry::file("a2", "a.log").with_created_time(at(11)),
                "B".repeat(40),
            )
            .with_chunk_size(7);
        let (store, mut orchestrator) = orchestrator(store, root.path(), false);

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(store.fetch_calls(), 1);
        assert_eq!(
            fs::read_to_string(root.path().join("2024-05-01/a.log")).unwrap(),
            "B".repeat(40)
        );
    }

    #[test]
    fn newest_per_name_keeps_first_listed_on_ties() {
        let files = vec![
            RemoteEntry::file("x1", "x.log"),
            RemoteEntry::file("y1", "y.log"),
            RemoteEntry::file("x2", "x.log"),
        ];
        let (unique, duplicates) = newest_per_name(files);
        let ids: Vec<_> = unique.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["x1", "y1"]);
        assert_eq!(duplicates[0].id.as_str(), "x2");
    }

    #[tokio::test]
    async fn existing_local_folder_is_reused() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("2024-05-01")).unwrap();
        fs::write(root.path().join("2024-05-01/a.log"), "stale").unwrap();
        let (_, mut orchestrator) = orchestrator(remote(), root.path(), false);

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.downloaded, 2);
        assert_eq!(fs::read_to_string(root.path().join("2024-05-01/a.log")).unwrap(), "aaaa");
    }

    #[tokio::test]
    async fn empty_root_only_sweeps() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("2024-01-01")).unwrap();
        let (_, mut orchestrator) = orchestrator(InMemoryRemoteStore::new(), root.path(), false);

        let report = orchestrator.tick().await.unwrap();

        assert!(report.folder.is_none());
        assert_eq!(report.sweep.unwrap().deleted, ["2024-01-01"]);
    }

    #[tokio::test]
    async fn latest_file_under_root_is_not_mirrored() {
        let root = tempfile::tempdir().unwrap();
        let store = InMemoryRemoteStore::new()
            .with_file("root", RemoteEntry::file("f", "stray.log"), "x");
        let (store, mut orchestrator) = orchestrator(store, root.path(), false);

        let report = orchestrator.tick().await.unwrap();

        assert!(report.folder.is_none());
        assert_eq!(store.fetch_calls(), 0);
        assert!(dir_names(root.path()).is_empty());
    }
}
