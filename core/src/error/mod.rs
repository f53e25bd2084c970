#[allow(clippy::module_inception)]
pub mod error;
pub mod backend;

pub use backend::{BackendError, TaskConflict};
pub use error::{CliError, CommandError, MalformedRecord};
pub use crate::task::TransitionError;
