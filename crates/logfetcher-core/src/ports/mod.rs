//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（Google Drive, OAuth トークン, 時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod remote_store;
pub mod token_source;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::remote_store::{ByteStream, RemoteStore};
pub use self::token_source::{StaticToken, TokenSource};
