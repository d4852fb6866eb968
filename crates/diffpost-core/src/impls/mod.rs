//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **GithubClient**: GitHub REST API（本番用）
//! - **InMemoryHosting**: テスト・dry-run 用

pub mod github;
pub mod inmem_hosting;

// 主要な型を再エクスポート
pub use self::github::GithubClient;
pub use self::inmem_hosting::InMemoryHosting;
