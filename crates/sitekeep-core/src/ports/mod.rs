//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ホスティング API, object storage, 時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//! ローカルファイルシステムは tokio::fs を直接使う。

pub mod clock;
pub mod hosting;
pub mod object_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::hosting::{ByteStream, HostingApi};
pub use self::object_store::ObjectStore;
