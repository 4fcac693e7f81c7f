//! Deployment module

pub mod fsm;
pub mod orchestrator;
pub mod panel;
pub mod registry;

pub use orchestrator::{AttemptReport, DeployRequest, Orchestrator};
