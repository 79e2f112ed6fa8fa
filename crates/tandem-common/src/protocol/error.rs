use thiserror::Error;

/// Network-level failure classes used by the retry policy.
///
/// Raw `std::io::Error`s coming out of connect/read/write are folded into one
/// of these before they cross the retry boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    ConnectionRefused,
    ConnectionReset,
    ConnectTimeout,
    HostNotFound,
    HostUnreachable,
    NetworkUnreachable,
    Other,
}

impl TransportClass {
    pub fn code(&self) -> &'static str {
        match self {
            TransportClass::ConnectionRefused => "CONNECTION_REFUSED",
            TransportClass::ConnectionReset => "CONNECTION_RESET",
            TransportClass::ConnectTimeout => "CONNECT_TIMEOUT",
            TransportClass::HostNotFound => "HOST_NOT_FOUND",
            TransportClass::HostUnreachable => "HOST_UNREACHABLE",
            TransportClass::NetworkUnreachable => "NETWORK_UNREACHABLE",
            TransportClass::Other => "TRANSPORT_ERROR",
        }
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => TransportClass::ConnectionRefused,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                TransportClass::ConnectionReset
            }
            ErrorKind::TimedOut => TransportClass::ConnectTimeout,
            ErrorKind::NotFound => TransportClass::HostNotFound,
            ErrorKind::HostUnreachable => TransportClass::HostUnreachable,
            ErrorKind::NetworkUnreachable | ErrorKind::NetworkDown => {
                TransportClass::NetworkUnreachable
            }
            _ => TransportClass::Other,
        }
    }
}

#[derive(Error, Debug)]
pub enum TandemError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid JSON in request body: {0}")]
    InvalidJson(String),

    #[error("Method not found: {method}")]
    MethodNotFound {
        method: String,
        available: Vec<String>,
    },

    #[error("Request body of {0} bytes exceeds maximum allowed size of {1} bytes")]
    PayloadTooLarge(usize, usize),

    #[error("Bulkhead limit exceeded for method '{method}' ({reason})")]
    BulkheadExceeded { method: String, reason: String },

    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Connection timeout after {0}ms")]
    ConnectTimeout(u64),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("Invalid response: {0}")]
    ParseError(String),

    #[error("Connection error: {message}")]
    Connection {
        class: TransportClass,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TandemError {
    /// Stable envelope code for this error.
    ///
    /// These strings are part of the wire contract; clients match on them.
    pub fn code(&self) -> String {
        match self {
            TandemError::Unauthorized(_) => "UNAUTHORIZED".into(),
            TandemError::Forbidden(_) => "FORBIDDEN".into(),
            TandemError::BadRequest(_) | TandemError::Config(_) => "BAD_REQUEST".into(),
            TandemError::InvalidJson(_) => "INVALID_JSON".into(),
            TandemError::MethodNotFound { .. } => "METHOD_NOT_FOUND".into(),
            TandemError::PayloadTooLarge(..) => "PAYLOAD_TOO_LARGE".into(),
            TandemError::BulkheadExceeded { .. } => "METHOD_BULKHEAD_EXCEEDED".into(),
            TandemError::CircuitOpen(_) => "CIRCUIT_OPEN".into(),
            TandemError::Timeout(_) | TandemError::ConnectTimeout(_) => "TIMEOUT".into(),
            TandemError::Http { status, .. } => format!("HTTP_{}", status),
            TandemError::Remote { code, .. } => code.clone(),
            TandemError::ParseError(_) => "PARSE_ERROR".into(),
            TandemError::Connection { class, .. } => class.code().into(),
            TandemError::Transport(_) | TandemError::Io(_) => "TRANSPORT_ERROR".into(),
            TandemError::Internal(_) | TandemError::Json(_) => "INTERNAL_ERROR".into(),
        }
    }

    /// HTTP status used when this error is written as an inbound response.
    pub fn http_status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            TandemError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            TandemError::Forbidden(_) => StatusCode::FORBIDDEN,
            TandemError::BadRequest(_) | TandemError::InvalidJson(_) | TandemError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            TandemError::MethodNotFound { .. } => StatusCode::NOT_FOUND,
            TandemError::PayloadTooLarge(..) => StatusCode::PAYLOAD_TOO_LARGE,
            TandemError::BulkheadExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TandemError::Http { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error belongs to the client-protocol partition.
    ///
    /// These surface immediately and are never retried, regardless of the
    /// retry policy.
    pub fn is_client_protocol(&self) -> bool {
        matches!(
            self.code().as_str(),
            "UNAUTHORIZED"
                | "FORBIDDEN"
                | "BAD_REQUEST"
                | "INVALID_JSON"
                | "METHOD_NOT_FOUND"
                | "PAYLOAD_TOO_LARGE"
        )
    }

    /// HTTP status carried by the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TandemError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Transport failure class, when this is a network-level error.
    pub fn transport_class(&self) -> Option<TransportClass> {
        match self {
            TandemError::Connection { class, .. } => Some(*class),
            TandemError::Transport(_) => Some(TransportClass::Other),
            TandemError::Io(e) => Some(TransportClass::from_io(e)),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TandemError::Timeout(_) | TandemError::ConnectTimeout(_)
        )
    }

    /// Adapt a raw connect/read/write error into the taxonomy.
    pub fn from_io_class(err: std::io::Error) -> Self {
        TandemError::Connection {
            class: TransportClass::from_io(&err),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TandemError>;
