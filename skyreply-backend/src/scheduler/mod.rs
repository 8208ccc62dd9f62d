mod runner;

pub use runner::{ReplyScheduler, SchedulerConfig};
