//! TaskPayload trait - 型付きペイロードの定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// TaskPayload は task_type とペイロード型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct CaptureScreen {
///     display: u32,
/// }
///
/// impl TaskPayload for CaptureScreen {
///     const TYPE: &'static str = "perception.capture";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: enqueue 時に JSON にするため
/// - `DeserializeOwned`: executor 側で JSON から復元するため
/// - `Send + Sync + 'static`: spawn されたタスクに渡すため
pub trait TaskPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// task_type の定義
    ///
    /// # 命名規約
    /// - `{domain}.{action}`
    /// - 例: `ai.request`, `gui.action`
    const TYPE: &'static str;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::TaskPayload;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Sum {
        pub values: Vec<i64>,
    }

    impl TaskPayload for Sum {
        const TYPE: &'static str = "test.sum";
    }
}
