//! Background workers

pub mod poller;
pub mod run_watcher;
