//! diffpost-core
//!
//! Core building blocks for turning chat-submitted diffs into pull requests.
//!
//! # モジュール構成
//! - **domain**: diff の正規化、proposal の識別子、TaskId
//! - **queue**: DelayQueue（単一ワーカー・FIFO・開始間隔の最小値を保証）
//! - **ports**: 抽象化レイヤー（HostingApi, Clock）
//! - **impls**: 実装（GithubClient, InMemoryHosting）
//! - **app**: ProposalService, ProposalCatalog, BridgeConfig

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
