//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: Orchestrator の構築とワイヤリング
//! - **Lister**: リモートフォルダの列挙（最新 1 件 / 全ページ）
//! - **Downloader**: ファイルのストリーム保存
//! - **RetentionSweeper**: 期限切れローカルコピーの削除
//! - **Orchestrator**: 1 tick（列挙 → ダウンロード → sweep）
//! - **Scheduler**: 毎日決まった時刻に tick を実行

pub mod builder;
pub mod downloader;
pub mod lister;
pub mod orchestrator;
pub mod scheduler;
pub mod sweeper;

// 主要な型を再エクスポート
pub use self::builder::{AppBuilder, BuildError};
pub use self::downloader::Downloader;
pub use self::lister::Lister;
pub use self::orchestrator::Orchestrator;
pub use self::scheduler::{DailySchedule, Scheduler};
pub use self::sweeper::RetentionSweeper;
