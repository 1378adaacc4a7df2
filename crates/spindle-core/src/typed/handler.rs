//! Handler trait - 型付きペイロードを処理する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Type erasure パターン (TypedExecutor<T, H> → dyn Executor)

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;

use super::task::TaskPayload;
use crate::domain::TaskInfo;
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::queue::ExecutionContext;

/// Handler は T を処理して Output を返す
///
/// # 使用例
/// ```ignore
/// struct CaptureHandler;
///
/// #[async_trait]
/// impl Handler<CaptureScreen> for CaptureHandler {
///     type Output = Frame;
///
///     async fn handle(&self, task: CaptureScreen, ctx: ExecutionContext) -> Result<Frame, ExecutorError> {
///         ctx.info(format!("capturing display {}", task.display));
///         grab(task.display).await
///     }
/// }
/// ```
///
/// # ジェネリクスによる型安全性
/// - `Handler<CaptureScreen>` は `CaptureScreen` しか受け取れない
/// - コンパイル時にペイロード型と Handler の対応が保証される
#[async_trait]
pub trait Handler<T: TaskPayload>: Send + Sync {
    type Output: Serialize + Send;

    async fn handle(&self, payload: T, ctx: ExecutionContext)
    -> Result<Self::Output, ExecutorError>;
}

/// Handler<T> を object-safe な `Executor` に変換するアダプタ
///
/// デコードに失敗したペイロードは `ExecutorError::Payload` になり、リトライされない。
pub struct TypedExecutor<T: TaskPayload, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TaskPayload, H: Handler<T>> TypedExecutor<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TaskPayload, H: Handler<T>> Executor for TypedExecutor<T, H> {
    async fn execute(
        &self,
        task: TaskInfo,
        ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutorError> {
        let payload: T = serde_json::from_value(task.data)?;
        let output = self.handler.handle(payload, ctx).await?;
        serde_json::to_value(output).map_err(|e| ExecutorError::failed(format!("output encode: {e}")))
    }
}
