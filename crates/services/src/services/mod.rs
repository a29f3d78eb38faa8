pub mod change_event;
pub mod config;
pub mod event_log;
pub mod notifications;
pub mod queue_consumer;
pub mod task_commands;
