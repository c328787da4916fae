//! RetentionSweeper - 期限切れのローカルコピーを削除
//!
//! # フロー
//! 1. ルート直下のエントリを列挙
//! 2. 予約名（実行ファイル、認証情報ファイル）は無視
//! 3. 名前の先頭 `YYYY-MM-DD` を解析（解析できなければスキップ）
//! 4. cutoff より前なら再帰的に削除（失敗はログに残して次へ）

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::{RetentionInterval, parse_date_prefix};
use crate::observability::SweepReport;

pub struct RetentionSweeper {
    root: PathBuf,
    interval: RetentionInterval,
    reserved: HashSet<String>,
    dry_run: bool,
}

impl RetentionSweeper {
    pub fn new(root: impl Into<PathBuf>, interval: RetentionInterval) -> Self {
        Self {
            root: root.into(),
            interval,
            reserved: HashSet::new(),
            dry_run: false,
        }
    }

    /// Names that are never considered, even if they look dated.
    pub fn with_reserved<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
        self
    }

    /// Log what would be deleted without deleting it.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn interval(&self) -> RetentionInterval {
        self.interval
    }

    /// Delete every dated entry under the root that is older than the interval.
    ///
    /// Only a failure to read the root itself is returned.
    pub async fn sweep(&self, now: DateTime<Utc>) -> io::Result<SweepReport> {
        let cutoff = self.interval.cutoff(now);
        let mut report = SweepReport::default();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        root = %self.root.display(),
                        "unable to read directory, stopping sweep early"
                    );
                    report.failed += 1;
                    break;
                }
            };

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                report.skipped += 1;
                continue;
            };
            if self.reserved.contains(&name) {
                report.skipped += 1;
                continue;
            }
            let Some(date) = parse_date_prefix(&name) else {
                report.skipped += 1;
                continue;
            };
            if !self.interval.is_date_expired(date, now) {
                report.kept += 1;
                continue;
            }

            if self.dry_run {
                tracing::info!(
                    entry = %name,
                    %date,
                    %cutoff,
                    "DRY RUN: would delete expired entry"
                );
                report.deleted.push(name);
                continue;
            }

            match remove_entry(&entry.path()).await {
                Ok(()) => {
                    tracing::info!(entry = %name, %date, %cutoff, "deleted expired entry");
                    report.deleted.push(name);
                }
                Err(e) => {
                    tracing::warn!(error = %e, entry = %name, "unable to delete expired entry");
                    report.failed += 1;
                }
            }
        }

        report.deleted.sort();
        Ok(report)
    }
}

/// Remove a directory tree, or a file or symlink (without following it).
async fn remove_entry(path: &Path) -> io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}
