//! Transport encoding for RPC payloads
//!
//! Payloads travel inside a code string executed by the kernel, so they are
//! carried as base64 of their JSON form. Base64 has no quotes, backslashes
//! or control characters that could collide with the surrounding statement.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Codec failures
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a serializable value for the kernel
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_string(value)?;
    Ok(STANDARD.encode(json))
}

/// Decode an encoded payload back into JSON.
///
/// Accepts the payload wrapped in one pair of matching quotes, which is how
/// the kernel renders a string's `repr`.
pub fn decode(raw: &str) -> Result<Value, CodecError> {
    let json = decode_to_string(raw)?;
    Ok(serde_json::from_str(&json)?)
}

/// Decode straight into a typed value
pub fn decode_as<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    let json = decode_to_string(raw)?;
    Ok(serde_json::from_str(&json)?)
}

/// Base64-decode without parsing, for diagnostics
pub fn decode_to_string(raw: &str) -> Result<String, CodecError> {
    let bytes = STANDARD.decode(strip_quotes(raw.trim()))?;
    Ok(String::from_utf8(bytes)?)
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}
