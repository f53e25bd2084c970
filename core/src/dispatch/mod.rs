//! Control actions against the executor, each followed by an immediate resync.

pub mod command;
pub mod dispatcher;

pub use command::{CommandKind, CreatedTask, PendingCommand};
pub use dispatcher::CommandDispatcher;
