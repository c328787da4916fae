//! Config - 実行時設定
//!
//! CLI（フラグ / 環境変数）から組み立て、`validate()` で起動時に検証します。
//! 必須なのは `folder_id` だけで、残りはすべて既定値があります。

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::lister::DEFAULT_PAGE_SIZE;
use crate::app::scheduler::DailySchedule;
use crate::app::builder::DEFAULT_DOWNLOAD_CONCURRENCY;
use crate::domain::{EntryId, RetentionInterval, SetupError};
use crate::impls::drive::DEFAULT_API_BASE;
use crate::retry::RetryPolicy;

/// Drive の `pageSize` 上限
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Remote root folder to watch.
    pub folder_id: EntryId,

    /// Mirror root and sweep root.
    /// Default: current directory
    pub local_root: PathBuf,

    /// Installed-app client secret file.
    pub credentials_path: PathBuf,

    /// Cached OAuth token.
    pub token_path: PathBuf,

    /// Default: 7 days
    pub retention: RetentionInterval,

    /// Default: 03:00 at +07:00
    pub schedule: DailySchedule,

    /// Connect and idle-read deadline for every remote call, and the total
    /// deadline for listings and token requests. Downloads may take longer
    /// as long as bytes keep arriving.
    pub request_timeout: Duration,

    pub page_size: u32,
    pub download_concurrency: usize,

    /// Attempts per remote call, counting the first.
    pub max_attempts: u32,

    pub dry_run_sweep: bool,
    pub api_base: String,
}

impl Config {
    /// Defaults for everything except the required folder id.
    pub fn new(folder_id: &str) -> Result<Self, SetupError> {
        let folder_id = folder_id.trim();
        if folder_id.is_empty() {
            return Err(SetupError::MissingConfig("folder_id"));
        }
        Ok(Self {
            folder_id: EntryId::new(folder_id),
            local_root: PathBuf::from("."),
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            retention: RetentionInterval::default(),
            schedule: DailySchedule::default(),
            request_timeout: Duration::from_secs(60),
            page_size: DEFAULT_PAGE_SIZE,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            max_attempts: RetryPolicy::default().max_attempts,
            dry_run_sweep: false,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Parse an optional retention value; absent means the default.
    pub fn parse_retention(value: Option<&str>) -> Result<RetentionInterval, SetupError> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(RetentionInterval::default()),
            Some(v) => v.parse().map_err(|e| SetupError::InvalidConfig {
                field: "retention",
                message: format!("{e}"),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.folder_id.as_str().trim().is_empty() {
            return Err(SetupError::MissingConfig("folder_id"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(invalid("page_size", format!("must be between 1 and {MAX_PAGE_SIZE}")));
        }
        if self.download_concurrency == 0 {
            return Err(invalid("download_concurrency", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be greater than zero"));
        }
        if !self.local_root.is_dir() {
            return Err(invalid(
                "root",
                format!("{} is not an existing directory", self.local_root.display()),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_attempts)
    }

    /// HTTP client shared by the OAuth and Drive clients.
    pub fn http_client(&self) -> Result<reqwest::Client, SetupError> {
        reqwest::Client::builder()
            .connect_timeout(self.request_timeout)
            .read_timeout(self.request_timeout)
            .user_agent(concat!("logfetcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SetupError::Client(e.to_string()))
    }

    /// File names under the local root the sweep must leave alone: the running
    /// executable, the client secret file and the token file.
    pub fn reserved_names(&self) -> Vec<String> {
        let exe = std::env::current_exe().ok();
        [exe.as_deref(), Some(self.credentials_path.as_path()), Some(self.token_path.as_path())]
            .into_iter()
            .flatten()
            .filter_map(file_name)
            .collect()
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}

fn invalid(field: &'static str, message: impl Into<String>) -> SetupError {
    SetupError::InvalidConfig {
        field,
        message: message.into(),
    }
}
