//! Notebook deployment over a kernel RPC bridge
//!
//! Calls named procedures inside a notebook kernel and drives the
//! snapshot, compile, upload and run phases of a pipeline deployment.

pub mod app;
pub mod codec;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod kernel;
pub mod logs;
pub mod models;
pub mod report;
pub mod rpc;
pub mod storage;
pub mod surface;
pub mod utils;
pub mod workers;
