//! Impls - ports の実装
//!
//! # 本番用
//! - **TwentyIClient**: HostingApi（reqwest）
//! - **B2Client**: ObjectStore（reqwest, Backblaze B2 native API）
//!
//! # 開発・テスト用
//! - **InMemoryHosting**, **InMemoryObjectStore**

mod http;

pub mod b2;
pub mod inmem_hosting;
pub mod inmem_store;
pub mod twenty_i;

pub use self::b2::B2Client;
pub use self::inmem_hosting::InMemoryHosting;
pub use self::inmem_store::InMemoryObjectStore;
pub use self::twenty_i::TwentyIClient;
