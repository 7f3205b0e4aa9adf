//! # Credence Questions
//!
//! 为校准训练游戏持续生成二选一题目
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 题目、数据行、标签策略、题库描述、作答记录
//! - `models/loaders` - 表格、XML 题库、题库清单的解析
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `TagRegistry` - 标签策略与父子标签解析
//! - `QuestionGenerator` - 三种出题算法
//! - `DatabaseRegistry` - 题库去重、槽位、启用状态、本地存取
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 出题流程
//! - `GenerationScheduler` - 后台生产任务与预读缓冲
//! - `QuizSession` - 会话状态，界面层唯一入口
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/database_sync` - 远程清单同步、逐个下载题库
//! - `clients/` - HTTP 下载客户端
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AnswerRecord, DatabaseDescriptor, Question, TagUsage};
pub use orchestrator::{AddOutcome, DatabaseSync, SyncProgress};
pub use services::{DatabaseRegistry, QuestionGenerator, TagRegistry};
pub use workflow::{GenerationScheduler, QuizSession};
