//! Jupyter server REST API

pub mod client;
pub mod kernels;
