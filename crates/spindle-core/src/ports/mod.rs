//! Ports - 抽象化レイヤー
//!
//! 時刻と ID 生成を trait で差し替え可能にし、テストで決定的にする。

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
