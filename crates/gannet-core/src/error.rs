//! Wire error codes and the dispatch-layer error taxonomy.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Protocol error codes carried in wire error frames.
///
/// The numeric values are fixed by the surrounding framing protocol and
/// must be carried unchanged. The dispatcher itself only ever produces
/// [`ErrorCode::BadRequest`] and [`ErrorCode::Unexpected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Timeout = 0x01,
    Cancelled = 0x02,
    Busy = 0x03,
    Declined = 0x04,
    Unexpected = 0x05,
    BadRequest = 0x06,
    NetworkError = 0x07,
    Unhealthy = 0x08,
    FatalProtocolError = 0xff,
}

impl ErrorCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Timeout),
            0x02 => Some(Self::Cancelled),
            0x03 => Some(Self::Busy),
            0x04 => Some(Self::Declined),
            0x05 => Some(Self::Unexpected),
            0x06 => Some(Self::BadRequest),
            0x07 => Some(Self::NetworkError),
            0x08 => Some(Self::Unhealthy),
            0xff => Some(Self::FatalProtocolError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Busy => write!(f, "busy"),
            Self::Declined => write!(f, "declined"),
            Self::Unexpected => write!(f, "unexpected error"),
            Self::BadRequest => write!(f, "bad request"),
            Self::NetworkError => write!(f, "network error"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::FatalProtocolError => write!(f, "fatal protocol error"),
        }
    }
}

/// An uncaught application error raised by an endpoint handler.
///
/// The original cause is preserved for observability; it rides along to
/// the application-error event instead of being flattened into a string.
#[derive(Debug, Clone)]
pub struct Fault {
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Build a fault that keeps the underlying error as its cause.
    pub fn with_cause(
        message: impl Into<String>,
        cause: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| &**c as &(dyn Error + 'static))
    }
}

/// Error returned by endpoint handlers.
///
/// The two variants settle a call differently: an invalid-endpoint signal
/// becomes a `BadRequest` frame and stays local, while a fault becomes an
/// `Unexpected` frame and is reported through the event sink.
#[derive(Debug)]
pub enum ServiceError {
    /// The handler explicitly signalled an unknown or invalid endpoint.
    InvalidEndpoint { endpoint: String, service: String },
    /// Any other uncaught application error.
    Fault(Fault),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEndpoint { endpoint, service } => {
                write!(
                    f,
                    "Endpoint '{endpoint}' for service '{service}' is not defined"
                )
            }
            Self::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fault(fault) => fault.source(),
            _ => None,
        }
    }
}

impl From<Fault> for ServiceError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

/// Errors local to the dispatch state machine.
///
/// By the time one of these is returned, the matching `BadRequest` error
/// frame has already been sent on the connection; these exist so the
/// aborted branches of the state machine are visible in the type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The declared `"as"` header does not match the resolved handler's
    /// request scheme. The handler was never invoked.
    SchemeMismatch {
        expected: String,
        actual: Option<String>,
    },
    /// The assembled endpoint name exceeded the protocol cap for arg1.
    EndpointOverflow { len: usize, max: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemeMismatch { expected, actual } => write!(
                f,
                "invalid arg scheme in request header: expected '{}', got {}",
                expected,
                match actual {
                    Some(a) => format!("'{a}'"),
                    None => "no header".into(),
                }
            ),
            Self::EndpointOverflow { len, max } => {
                write!(f, "endpoint name {len} bytes exceeds max {max}")
            }
        }
    }
}

impl Error for DispatchError {}

/// A settle-once cell (a [`Promise`](crate::Promise) or a
/// [`Response`](crate::Response)) was resolved a second time.
///
/// This is a programmer error; the first outcome is never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadySettled;

impl fmt::Display for AlreadySettled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "already settled")
    }
}

impl Error for AlreadySettled {}
