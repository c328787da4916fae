//! State - オーケストレータのフェーズ
//!
//! # 状態遷移
//! - bootstrapping: 起動直後の最初の tick。列挙のみでダウンロードしない
//! - steady: 列挙 + ダウンロード + sweep
//!
//! bootstrapping → steady は最初の列挙の直後に一度だけ起こります（成否に関係なく）。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Bootstrapping,
    Steady,
}

impl Phase {
    /// Initial phase for a freshly started process.
    pub fn initial(skip_first_download: bool) -> Self {
        if skip_first_download {
            Phase::Bootstrapping
        } else {
            Phase::Steady
        }
    }

    pub fn downloads_enabled(self) -> bool {
        matches!(self, Phase::Steady)
    }

    /// Phase after a listing has completed (successfully or not).
    pub fn after_listing(self) -> Self {
        Phase::Steady
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Bootstrapping => f.write_str("bootstrapping"),
            Phase::Steady => f.write_str("steady"),
        }
    }
}
