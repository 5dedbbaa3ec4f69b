//! Error taxonomy shared by every layer of the appliance client.

use thiserror::Error;

/// Top-level client error type.
///
/// Variants fall into three groups:
/// - validation ([`AkmError::Configuration`], [`AkmError::MissingKeyName`],
///   [`AkmError::FieldTooNarrow`], [`AkmError::OutOfRange`],
///   [`AkmError::InvalidCiphertext`]) raised before any network I/O
/// - transport ([`AkmError::ConnectFailure`]) raised after the single
///   primary → backup fallback is exhausted
/// - protocol ([`AkmError::NoResponse`], [`AkmError::TruncatedResponse`],
///   [`AkmError::MalformedResponse`], [`AkmError::ApplianceRejected`],
///   [`AkmError::Io`]) raised on an open session and never retried
#[derive(Debug, Error)]
pub enum AkmError {
    /// A required configuration field is absent or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configured key name is empty.
    #[error("key name is required")]
    MissingKeyName,

    /// A value does not fit its fixed-width wire field.
    #[error("{field} is {len} bytes but its wire field is {width} bytes wide")]
    FieldTooNarrow {
        field: &'static str,
        width: usize,
        len: usize,
    },

    /// A number cannot be represented in its fixed-width decimal field.
    #[error("{value} does not fit in a {width}-digit length field")]
    OutOfRange { value: usize, width: usize },

    /// The value handed to decrypt is not a well-formed ciphertext blob.
    #[error("invalid ciphertext blob: {0}")]
    InvalidCiphertext(String),

    /// Neither the primary nor the backup appliance could be reached.
    #[error("unable to reach key appliance (primary: {primary}; backup: {})", .backup.as_deref().unwrap_or("not configured"))]
    ConnectFailure {
        primary: String,
        backup: Option<String>,
    },

    /// The appliance closed the session without a parseable length prefix.
    #[error("no response from key appliance")]
    NoResponse,

    /// The stream ended before the declared number of bytes arrived.
    #[error("truncated response: expected {expected} bytes, received {received}")]
    TruncatedResponse { expected: usize, received: usize },

    /// A response sub-field could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The appliance answered with a non-success status code.
    #[error("appliance rejected the request with status {status}")]
    ApplianceRejected { status: String },

    /// Reading from or writing to an open session failed.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AkmError {
    /// Short machine-readable code for this error, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            AkmError::Configuration(_) => "configuration_error",
            AkmError::MissingKeyName => "missing_key_name",
            AkmError::FieldTooNarrow { .. } => "field_too_narrow",
            AkmError::OutOfRange { .. } => "out_of_range",
            AkmError::InvalidCiphertext(_) => "invalid_ciphertext",
            AkmError::ConnectFailure { .. } => "connect_failure",
            AkmError::NoResponse => "no_response",
            AkmError::TruncatedResponse { .. } => "truncated_response",
            AkmError::MalformedResponse(_) => "malformed_response",
            AkmError::ApplianceRejected { .. } => "appliance_rejected",
            AkmError::Io(_) => "io_error",
        }
    }

    /// Returns `true` for errors raised before any connection is attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AkmError::Configuration(_)
                | AkmError::MissingKeyName
                | AkmError::FieldTooNarrow { .. }
                | AkmError::OutOfRange { .. }
                | AkmError::InvalidCiphertext(_)
        )
    }
}
