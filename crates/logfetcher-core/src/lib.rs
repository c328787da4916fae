//! logfetcher-core
//!
//! Core building blocks for the log archive fetcher: mirror the newest folder of
//! a remote root into a local directory once a day, then delete local copies
//! older than the retention interval.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（entry, retention, state, errors）
//! - **ports**: 抽象化レイヤー（RemoteStore, TokenSource, Clock）
//! - **app**: アプリケーションロジック（builder, lister, downloader, sweeper, orchestrator, scheduler）
//! - **impls**: 実装（DriveStore, OAuthTokenSource, InMemoryRemoteStore）
//! - **config**: 実行時設定と起動時検証
//! - **retry**: 一時的なエラーの再試行
//! - **observability**: tick / sweep のレポート

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod retry;
