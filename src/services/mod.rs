pub mod jobs;
pub mod queue;
pub mod recognition;
pub mod storage;
pub mod thumbnail;
