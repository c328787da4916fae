//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **DriveStore**: Google Drive v3 の RemoteStore
//! - **OAuthTokenSource**: キャッシュ済みトークンを自動更新する TokenSource
//! - **InMemoryRemoteStore**: 開発用・テスト用の RemoteStore

pub mod drive;
pub mod inmem_store;
pub mod oauth;

// 主要な型を再エクスポート
pub use self::drive::DriveStore;
pub use self::inmem_store::InMemoryRemoteStore;
pub use self::oauth::{ClientSecret, OAuthClient, OAuthTokenSource, StoredToken};
