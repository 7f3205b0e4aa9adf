//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `database_sync` - 题库同步
//! - 远程清单合并、逐个下载题库、按 url 添加题库
//! - 通过 `watch` 通道发布进度
//!
//! ## 层次关系
//!
//! ```text
//! app::App
//!     ↓
//! workflow::QuizSession ──→ orchestrator::DatabaseSync ──→ clients::FetchClient
//!     ↓
//! workflow::GenerationScheduler
//!     ↓
//! services (TagRegistry / QuestionGenerator / DatabaseRegistry)
//! ```

pub mod database_sync;

pub use database_sync::{AddOutcome, DatabaseSync, SyncProgress, SyncReport};
