pub mod health;
pub mod metrics;
pub mod queue;
pub mod uploads;
