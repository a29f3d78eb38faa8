pub mod queue_message;
pub mod task;
