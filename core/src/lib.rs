//! taskpulse-core: 长任务生命周期与轮询引擎
//!
//! Keeps a client-side view of server-executed background tasks consistent
//! with the executor, and routes pause/resume/stop/delete through it.

pub mod api;
pub mod backend;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod poller;
pub mod registry;
pub mod task;
