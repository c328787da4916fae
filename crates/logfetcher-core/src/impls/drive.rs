//! DriveStore - Google Drive v3 の RemoteStore 実装
//!
//! - 列挙: `GET /drive/v3/files?q='<id>' in parents&orderBy=createdTime desc`
//! - 取得: `GET /drive/v3/files/<id>?alt=media`
//!
//! 認可ヘッダは TokenSource から毎回取得します（リフレッシュは TokenSource 側）。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use url::Url;

use crate::domain::{EntryId, EntryPage, FetchError, PageRequest, RemoteEntry, SetupError};
use crate::ports::{ByteStream, RemoteStore, TokenSource};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, createdTime)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        RemoteEntry::new(file.id, file.name, file.mime_type, file.created_time)
    }
}

pub struct DriveStore<T> {
    http: reqwest::Client,
    files_url: Url,
    tokens: T,
    list_timeout: Option<Duration>,
}

impl<T: TokenSource> DriveStore<T> {
    /// `api_base` is the root the Drive API lives under, e.g. [`DEFAULT_API_BASE`].
    /// A path prefix (`http://proxy/google`) is kept, with or without a trailing slash.
    pub fn new(http: reqwest::Client, api_base: &str, tokens: T) -> Result<Self, SetupError> {
        let invalid = |message: String| SetupError::InvalidConfig {
            field: "api_base",
            message,
        };
        let mut base = Url::parse(api_base).map_err(|e| invalid(format!("{api_base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(invalid(format!("{api_base} cannot be used as a base URL")));
        }
        // join() replaces the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let files_url = base
            .join("drive/v3/files")
            .map_err(|e| invalid(format!("{api_base}: {e}")))?;
        Ok(Self {
            http,
            files_url,
            tokens,
            list_timeout: None,
        })
    }

    /// Total deadline for one listing call. Media downloads are bounded only
    /// by the client's connect and read timeouts.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = Some(timeout);
        self
    }

    fn file_url(&self, file: &EntryId) -> Url {
        let mut url = self.files_url.clone();
        // files_url is checked to be a base URL in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(file.as_str());
        }
        url
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        check_status(response, what).await
    }
}

#[async_trait]
impl<T: TokenSource> RemoteStore for DriveStore<T> {
    async fn list_page(
        &self,
        folder: &EntryId,
        page: PageRequest,
    ) -> Result<EntryPage, FetchError> {
        let q = parents_query(folder);
        let page_size = page.page_size.max(1).to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("corpora", "user"),
            ("includeItemsFromAllDrives", "true"),
            ("supportsAllDrives", "true"),
            ("orderBy", "createdTime desc"),
            ("q", q.as_str()),
            ("pageSize", page_size.as_str()),
            ("fields", LIST_FIELDS),
        ];
        if let Some(token) = page.page_token.as_deref() {
            query.push(("pageToken", token));
        }

        let mut request = self.http.get(self.files_url.clone()).query(&query);
        if let Some(timeout) = self.list_timeout {
            request = request.timeout(timeout);
        }
        let response = self.send(request, &format!("folder {folder}")).await?;
        let list: FileList = response
            .json()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    transport(e)
                } else {
                    FetchError::Decode(format!("folder {folder}: {e}"))
                }
            })?;

        Ok(EntryPage {
            entries: list.files.into_iter().map(RemoteEntry::from).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch(&self, file: &EntryId) -> Result<ByteStream, FetchError> {
        let request = self
            .http
            .get(self.file_url(file))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        let response = self.send(request, &format!("file {file}")).await?;
        Ok(response.bytes_stream().map_err(transport).boxed())
    }
}

/// Drive query selecting the children of `folder`.
fn parents_query(folder: &EntryId) -> String {
    let escaped = folder.as_str().replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents")
}

fn transport(err: reqwest::Error) -> FetchError {
    // a body read that times out is also reported as a decode error
    if err.is_timeout() {
        FetchError::Transport(format!("timed out: {err}"))
    } else if err.is_decode() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body).unwrap_or(body);
    Err(match status.as_u16() {
        404 => FetchError::NotFound(format!("{what}: {message}")),
        401 | 403 => FetchError::Unauthorized(format!("{what}: {message}")),
        code => FetchError::Status {
            status: code,
            message: format!("{what}: {message}"),
        },
    })
}

/// Extracts `error.message` from a Google API error body.
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
