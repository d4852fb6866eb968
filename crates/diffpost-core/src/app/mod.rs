//! App - アプリケーション層
//!
//! ports と queue を組み合わせて、チャットコマンド相当の操作を提供します。
//!
//! # 主要コンポーネント
//! - **ProposalService**: eligibility → normalize → タスク投入
//! - **ProposalCatalog**: open な proposal のキャッシュと検索
//! - **BridgeConfig**: 設定

pub mod catalog;
pub mod config;
pub mod service;

// 主要な型を再エクスポート
pub use self::catalog::{ProposalCatalog, ProposalSummary};
pub use self::config::{BridgeConfig, ConfigError};
pub use self::service::{CreateProposal, EditProposal, ProposalError, ProposalService, Submission};
