//! OAuth - インストール型アプリの認可とトークンキャッシュ
//!
//! - `credentials.json`: Google Cloud Console からダウンロードしたクライアント情報
//! - `token.json`: 認可後のアクセストークン / リフレッシュトークン
//!
//! OAuthTokenSource は期限切れが近づいたら自動でリフレッシュし、
//! 新しいトークンを `token.json` に書き戻します。

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use url::Url;

use crate::domain::{FetchError, SetupError};
use crate::ports::{Clock, SystemClock, TokenSource};

/// Read-only access to Drive files.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

const OUT_OF_BAND_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Refresh this long before the reported expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Client id and secret of an installed (or web) OAuth application.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())
    }

    pub async fn load(path: &Path) -> Result<Self, SetupError> {
        let credentials = |message: String| SetupError::Credentials {
            path: path.to_path_buf(),
            message,
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| credentials(e.to_string()))?;
        Self::from_json(&bytes).map_err(credentials)
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(OUT_OF_BAND_REDIRECT)
    }

    /// Consent page URL the user opens to authorize offline access.
    pub fn authorization_url(&self, scope: &str, state: &str) -> Result<Url, SetupError> {
        let mut url = Url::parse(&self.auth_uri).map_err(|e| SetupError::InvalidConfig {
            field: "auth_uri",
            message: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri())
            .append_pair("response_type", "code")
            .append_pair("scope", scope)
            .append_pair("state", state);
        Ok(url)
    }
}

/// Random value for the `state` parameter of the consent URL.
pub fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Token cache format (`token.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Whether the access token should be refreshed before use at `now`.
    ///
    /// A missing expiry (or the zero time some writers use) never expires.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) if expiry.year() > 1 => {
                expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now
            }
            _ => false,
        }
    }

    /// Load a cached token. `Ok(None)` when the file does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>, SetupError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SetupError::Token(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SetupError::Token(format!("{}: {e}", path.display()))),
        }
    }

    /// Write the token, readable by the owner only.
    pub async fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec(self).map_err(io::Error::other)?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(path).await?;
        file.write_all(&json).await?;
        file.flush().await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            token_type: self.token_type,
            // refresh responses usually omit the refresh token
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }
}

/// Talks to the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    secret: ClientSecret,
    timeout: Option<std::time::Duration>,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, secret: ClientSecret) -> Self {
        Self {
            http,
            secret,
            timeout: None,
        }
    }

    /// Total deadline for one token endpoint call.
    pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn secret(&self) -> &ClientSecret {
        &self.secret
    }

    /// Exchange an authorization code for the first token.
    pub async fn exchange_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<StoredToken, FetchError> {
        let response = self
            .post_token(&[
                ("grant_type", "authorization_code"),
                ("code", code.trim()),
                ("redirect_uri", self.secret.redirect_uri()),
            ])
            .await?;
        Ok(response.into_token(now, None))
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<StoredToken, FetchError> {
        let response = self
            .post_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        Ok(response.into_token(now, Some(refresh_token.to_string())))
    }

    async fn post_token(&self, grant: &[(&str, &str)]) -> Result<TokenResponse, FetchError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);

        let mut request = self.http.post(&self.secret.token_uri).form(&form);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("token endpoint: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Token(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(format!("token response: {e}")))
    }
}

/// TokenSource backed by a cached OAuth token that refreshes itself.
pub struct OAuthTokenSource<C = SystemClock> {
    client: OAuthClient,
    token: Mutex<StoredToken>,
    token_path: Option<PathBuf>,
    clock: C,
}

impl OAuthTokenSource<SystemClock> {
    pub fn new(client: OAuthClient, token: StoredToken) -> Self {
        Self::with_clock(client, token, SystemClock)
    }
}

impl<C: Clock> OAuthTokenSource<C> {
    pub fn with_clock(client: OAuthClient, token: StoredToken, clock: C) -> Self {
        Self {
            client,
            token: Mutex::new(token),
            token_path: None,
            clock,
        }
    }

    /// Persist refreshed tokens to `path`.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    pub async fn current(&self) -> StoredToken {
        self.token.lock().await.clone()
    }
}

#[async_trait]
impl<C: Clock> TokenSource for OAuthTokenSource<C> {
    async fn access_token(&self) -> Result<String, FetchError> {
        let mut token = self.token.lock().await;
        let now = self.clock.now();
        if !token.needs_refresh(now) {
            return Ok(token.access_token.clone());
        }

        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            FetchError::Token("access token expired and no refresh token is cached".into())
        })?;
        let refreshed = self.client.refresh(&refresh_token, now).await?;
        tracing::debug!(expiry = ?refreshed.expiry, "refreshed access token");

        if let Some(path) = &self.token_path
            && let Err(e) = refreshed.save(path).await
        {
            tracing::warn!(error = %e, path = %path.display(), "unable to cache refreshed token");
        }

        *token = refreshed;
        Ok(token.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CREDENTIALS: &str = r#"{
        "installed": {
            "client_id": "client-1.apps.googleusercontent.com",
            "project_id": "logs",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "s3cret",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    fn secret_for(server: &MockServer) -> ClientSecret {
        ClientSecret {
            token_uri: format!("{}/token", server.uri()),
            ..ClientSecret::from_json(CREDENTIALS.as_bytes()).unwrap()
        }
    }

    #[test]
    fn parses_installed_credentials() {
        let secret = ClientSecret::from_json(CREDENTIALS.as_bytes()).unwrap();
        assert_eq!(secret.client_id, "client-1.apps.googleusercontent.com");
        assert_eq!(secret.redirect_uri(), "http://localhost");
    }

    #[test]
    fn rejects_credentials_without_client_section() {
        assert!(ClientSecret::from_json(br#"{"other": {}}"#).is_err());
    }

    #[test]
    fn authorization_url_requests_offline_readonly_access() {
        let secret = ClientSecret::from_json(CREDENTIALS.as_bytes()).unwrap();
        let url = secret.authorization_url(DRIVE_READONLY_SCOPE, "st4te").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("scope".into(), DRIVE_READONLY_SCOPE.into())));
        assert!(pairs.contains(&("state".into(), "st4te".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
    }

    #[test]
    fn random_state_is_alphanumeric() {
        let state = random_state();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, random_state());
    }

    #[test]
    fn expiry_uses_skew_and_ignores_zero_time() {
        let mut token = StoredToken {
            access_token: "a".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: Some(noon() + Duration::seconds(30)),
        };
        assert!(token.needs_refresh(noon()));

        token.expiry = Some(noon() + Duration::minutes(10));
        assert!(!token.needs_refresh(noon()));

        token.expiry = Some(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap());
        assert!(!token.needs_refresh(noon()));

        token.expiry = None;
        assert!(!token.needs_refresh(noon()));
    }

    #[test]
    fn reads_token_cache_with_offset_expiry() {
        let json = r#"{
            "access_token": "ya29",
            "token_type": "Bearer",
            "refresh_token": "1//r",
            "expiry": "2024-05-20T19:00:00.5+07:00"
        }"#;
        let token: StoredToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));
        assert!(token.needs_refresh(noon()));
    }

    #[tokio::test]
    async fn token_cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        assert_eq!(StoredToken::load(&path).await.unwrap(), None);

        let token = StoredToken {
            access_token: "a".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("r".into()),
            expiry: Some(noon()),
        };
        token.save(&path).await.unwrap();
        assert_eq!(StoredToken::load(&path).await.unwrap(), Some(token));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn refreshes_expired_token_and_persists_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let expired = StoredToken {
            access_token: "stale".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("old-refresh".into()),
            expiry: Some(noon() - Duration::minutes(5)),
        };
        let source = OAuthTokenSource::with_clock(
            OAuthClient::new(reqwest::Client::new(), secret_for(&server)),
            expired,
            FixedClock::new(noon()),
        )
        .persist_to(&token_path);

        assert_eq!(source.access_token().await.unwrap(), "fresh");
        // second call is served from the cache
        assert_eq!(source.access_token().await.unwrap(), "fresh");

        let saved = StoredToken::load(&token_path).await.unwrap().unwrap();
        assert_eq!(saved.access_token, "fresh");
        assert_eq!(saved.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(saved.expiry, Some(noon() + Duration::seconds(3599)));
    }

    #[tokio::test]
    async fn rejected_refresh_is_a_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let source = OAuthTokenSource::with_clock(
            OAuthClient::new(reqwest::Client::new(), secret_for(&server)),
            StoredToken {
                access_token: "stale".into(),
                token_type: "Bearer".into(),
                refresh_token: Some("revoked".into()),
                expiry: Some(noon()),
            },
            FixedClock::new(noon()),
        );

        let err = source.access_token().await.unwrap_err();
        assert!(matches!(err, FetchError::Token(ref m) if m.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn exchanges_authorization_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=4%2Fabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "first",
                "token_type": "Bearer",
                "refresh_token": "r1",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(reqwest::Client::new(), secret_for(&server));
        let token = client.exchange_code(" 4/abc\n", noon()).await.unwrap();
        assert_eq!(token.access_token, "first");
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    }
}
