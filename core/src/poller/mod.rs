//! Timer-driven task-list synchronisation with a failure circuit breaker.

pub mod controller;
pub mod status;

pub use controller::PollingController;
pub use status::{PollMode, PollOrigin, PollOutcome, PollingSnapshot, PollingStatus};
