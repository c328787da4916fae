//! Errors - エラー型と分類
//!
//! # 分類
//! - setup: 起動時のエラー（設定・認証情報）。プロセスを終了する
//! - tick: ルートフォルダの列挙失敗。その tick だけを中断する
//! - item: 1 ファイルのダウンロードや 1 エントリの削除の失敗。ログに残して次へ進む

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::entry::EntryId;
use crate::app::builder::BuildError;

/// ErrorKind はリモート呼び出しの失敗の分類
///
/// - Transient: 一時的なエラー（リトライ対象）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: 認証情報やトークンキャッシュの障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Failure of a single remote call (listing or fetching bytes).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("token: {0}")]
    Token(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport(_) => ErrorKind::Transient,
            FetchError::Status { status, .. } if *status == 429 || *status >= 500 => {
                ErrorKind::Transient
            }
            FetchError::Token(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Failure of a single file download. Never aborts sibling downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("fetch {file}: {source}")]
    Fetch {
        file: EntryId,
        #[source]
        source: FetchError,
    },

    #[error("create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copy into {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("move into place {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to write remote name {0:?} outside the folder")]
    InvalidName(String),
}

impl DownloadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DownloadError::Fetch { source, .. } if source.is_transient())
    }
}

/// Aborts the current tick. The process keeps running.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("listing root folder {folder}: {source}")]
    Listing {
        folder: EntryId,
        #[source]
        source: FetchError,
    },
}

/// Unrecoverable start-up error. The process exits with a non-zero status.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid configuration {field}: {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("unable to read client secret file {}: {message}", path.display())]
    Credentials { path: PathBuf, message: String },

    #[error("token: {0}")]
    Token(String),

    #[error("unable to build HTTP client: {0}")]
    Client(String),

    #[error(transparent)]
    Build(#[from] BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FetchError::Transport("timed out".into()), ErrorKind::Transient)]
    #[case(FetchError::Status { status: 503, message: String::new() }, ErrorKind::Transient)]
    #[case(FetchError::Status { status: 429, message: String::new() }, ErrorKind::Transient)]
    #[case(FetchError::Status { status: 400, message: String::new() }, ErrorKind::Permanent)]
    #[case(FetchError::NotFound("file".into()), ErrorKind::Permanent)]
    #[case(FetchError::Unauthorized("expired".into()), ErrorKind::Permanent)]
    #[case(FetchError::Token("refresh failed".into()), ErrorKind::Infrastructure)]
    fn classifies_fetch_errors(#[case] err: FetchError, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn not_found_carries_context() {
        let err = FetchError::NotFound("File not found: abc".into());
        assert_eq!(err.to_string(), "not found: File not found: abc");
    }

    #[test]
    fn download_error_is_transient_only_for_transient_fetches() {
        let transient = DownloadError::Fetch {
            file: EntryId::new("a"),
            source: FetchError::Transport("reset".into()),
        };
        let permanent = DownloadError::Fetch {
            file: EntryId::new("a"),
            source: FetchError::NotFound("a".into()),
        };
        let local = DownloadError::Create {
            path: PathBuf::from("x/a.log"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert!(!local.is_transient());
        assert!(local.to_string().starts_with("create x/a.log:"));
    }
}
