pub mod consumer;
pub mod service;

pub use consumer::{consume, run};
pub use service::{ConsumeError, NotificationService, ProcessOutcome};
