//! spindle-core
//!
//! In-process priority task scheduler for an autonomous desktop agent.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, priority, task options, status, result, events）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator）
//! - **queue**: `TaskQueue` 本体（admission, dispatch, supervision, retry, status）
//! - **executor**: `Executor` trait とレジストリ
//! - **typed**: 型付き Task API（TaskPayload trait, Handler trait）
//! - **config**: `QueueConfig`（TOML から読み込み可能）
//! - **error**: エラー型

pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod ports;
pub mod queue;
pub mod typed;

pub use config::QueueConfig;
pub use domain::{
    Priority, QueueEvent, TaskId, TaskInfo, TaskOptions, TaskResult, TaskStatus, TaskType,
};
pub use error::{ConfigError, ExecutorError, TaskError, WaitError};
pub use executor::{Executor, ExecutorRegistry, FnExecutor, executor_fn};
pub use queue::{ExecutionContext, QueueCounts, QueueStatus, TaskQueue, TaskSnapshot};
pub use typed::{Handler, TaskPayload};
