//! Ports - 抽象化レイヤー
//!
//! 外部システム（hosting API, 時刻）へのインターフェースを trait として定義し、
//! 実装の詳細を隠蔽します。実装は `impls` にあります。

pub mod clock;
pub mod hosting;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::hosting::{
    FileWrite, HostingApi, HostingError, NewPull, PullRequest, RemoteFile, RepoRef,
};
