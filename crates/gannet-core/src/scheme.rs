//! Argument serialization schemes (the `"as"` header).
//!
//! A scheme exposes a name plus encode/decode behavior for positional
//! call arguments; the dispatcher only ever compares names and passes the
//! scheme through to the bound request/response. Concrete encodings
//! beyond `raw` and `json` live outside this crate.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Scheme names defined by the surrounding protocol.
pub mod scheme_name {
    pub const RAW: &str = "raw";
    pub const JSON: &str = "json";
    pub const THRIFT: &str = "thrift";
}

/// Errors produced while encoding or decoding call arguments.
#[derive(Debug)]
pub enum CodecError {
    Json(serde_json::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "json codec error: {e}"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A decoded positional call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Uninterpreted bytes (`raw` scheme).
    Bytes(Bytes),
    /// A JSON value (`json` scheme).
    Json(serde_json::Value),
}

/// A negotiated argument serialization scheme.
pub trait ArgScheme: Send + Sync {
    /// The name carried in the `"as"` transport header.
    fn name(&self) -> &'static str;

    /// Encode one positional argument into wire bytes.
    fn encode(&self, arg: &Arg) -> Result<Bytes, CodecError>;

    /// Decode one positional argument from wire bytes.
    fn decode(&self, raw: Bytes) -> Result<Arg, CodecError>;
}

/// Identity scheme: arguments are opaque byte strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawScheme;

impl ArgScheme for RawScheme {
    fn name(&self) -> &'static str {
        scheme_name::RAW
    }

    fn encode(&self, arg: &Arg) -> Result<Bytes, CodecError> {
        match arg {
            Arg::Bytes(bytes) => Ok(bytes.clone()),
            // A JSON value handed to the raw scheme is passed through as
            // its serialized text, matching the permissive original.
            Arg::Json(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }

    fn decode(&self, raw: Bytes) -> Result<Arg, CodecError> {
        Ok(Arg::Bytes(raw))
    }
}

/// JSON scheme: arguments are JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonScheme;

impl ArgScheme for JsonScheme {
    fn name(&self) -> &'static str {
        scheme_name::JSON
    }

    fn encode(&self, arg: &Arg) -> Result<Bytes, CodecError> {
        match arg {
            Arg::Json(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
            // Already-encoded bytes go out untouched.
            Arg::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    fn decode(&self, raw: Bytes) -> Result<Arg, CodecError> {
        Ok(Arg::Json(serde_json::from_slice(&raw)?))
    }
}

/// The default scheme injected where registration omits one.
pub fn default_scheme() -> Arc<dyn ArgScheme> {
    Arc::new(RawScheme)
}
