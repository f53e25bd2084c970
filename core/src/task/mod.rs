//! Canonical task model and the pure logic around it.

pub mod model;
pub mod normalize;
pub mod progress;
pub mod transitions;

pub use model::{ResultSummary, Task, TaskKind, TaskStatus};
pub use normalize::{normalize_batch, normalize_conflict, normalize_task, unwrap_list};
pub use progress::{format_duration, format_throughput, progress_view, ProgressView, Tone};
pub use transitions::{Observation, TaskAction, TaskTransition, TransitionError};
