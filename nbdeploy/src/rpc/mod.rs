//! Remote procedure calls into the notebook kernel

pub mod client;
pub mod procedures;

pub use client::{
    build_invocation_statement, build_unmarshal_statement, validate_function_name, RemoteCall, RpcClient,
};
