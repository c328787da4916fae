//! Observability - tick / sweep のレポート
//!
//! `--once` では TickReport を JSON で stdout に出力します。

use serde::Serialize;

use crate::domain::Phase;

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Names removed (or, in dry-run mode, that would have been removed).
    pub deleted: Vec<String>,
    pub kept: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// Phase the tick ran in.
    pub phase: Phase,
    /// Display name of the remote folder mirrored in this tick.
    pub folder: Option<String>,
    pub listed: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub skipped_folders: usize,
    /// Files not downloaded because a newer file in the folder has the same name.
    pub skipped_duplicates: usize,
    pub bytes_written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepReport>,
}

impl TickReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            folder: None,
            listed: 0,
            downloaded: 0,
            failed: 0,
            skipped_folders: 0,
            skipped_duplicates: 0,
            bytes_written: 0,
            sweep: None,
        }
    }
}
