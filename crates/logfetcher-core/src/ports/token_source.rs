//! TokenSource port - アクセストークンの供給
//!
//! リフレッシュは実装側で透過的に行います。呼び出し側は毎回
//! `access_token()` を呼ぶだけです。

use async_trait::async_trait;

use crate::domain::FetchError;

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A bearer token valid for at least the next request.
    async fn access_token(&self) -> Result<String, FetchError>;
}

/// Returns the same token forever. Useful against local test servers.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, FetchError> {
        Ok(self.0.clone())
    }
}
