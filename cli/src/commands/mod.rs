pub mod cli;
pub mod jobs;
pub mod params;
pub mod tasks;
pub mod watch;
