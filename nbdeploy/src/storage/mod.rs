//! Persistent storage

pub mod layout;
pub mod notebook;
pub mod settings;
