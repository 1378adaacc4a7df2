//! Domain model (ids, priorities, task options, statuses, results, events).

pub mod events;
pub mod ids;
pub mod priority;
pub mod result;
pub mod state;
pub mod task;

pub use events::QueueEvent;
pub use ids::TaskId;
pub use priority::{ParsePriorityError, Priority};
pub use result::TaskResult;
pub use state::TaskStatus;
pub use task::{TaskInfo, TaskOptions, TaskType};

pub(crate) use task::as_millis;
