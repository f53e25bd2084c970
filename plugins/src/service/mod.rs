pub mod jobs;
pub mod tasks;

pub use jobs::HttpJobBackend;
pub use tasks::HttpTaskBackend;
