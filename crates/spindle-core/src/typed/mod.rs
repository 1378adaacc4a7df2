//! Typed - 型付き Task API
//!
//! このモジュールは task_type の typo を型で排除し、
//! Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `TaskPayload` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `Executor` trait object - `TypedExecutor` で型消去

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{Handler, TypedExecutor};
pub use self::task::TaskPayload;
