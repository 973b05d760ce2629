//! Error types for the shop SOAP service.

use thiserror::Error;

/// Numeric fault codes rendered in `<ErrorCode>`.
///
/// The legacy client only distinguishes these small integers; the human
/// readable message attached to a fault never leaves the server.
pub mod fault_codes {
    /// No fault.
    pub const OK: i32 = 0;
    /// The action named in the request has no registered handler.
    pub const UNSUPPORTED_ACTION: i32 = 1;
    /// Generic ECS failure (missing key, store error, ticket failure).
    pub const ECS_FAILURE: i32 = 2;
    /// CAS filter or licence validation failure.
    pub const CAS_INVALID_FILTER: i32 = 5;
    /// CAS request without a title.
    pub const CAS_MISSING_TITLE: i32 = 9;
    /// IAS registration lookup failure.
    pub const IAS_CHECK_FAILED: i32 = 5;
    pub const IAS_SYNC_FAILED: i32 = 107;
    pub const IAS_MISSING_DEVICE_CODE: i32 = 117;
    pub const IAS_MISSING_REGION: i32 = 127;
    pub const IAS_REGION_MISMATCH: i32 = 137;
    pub const IAS_MISSING_SERIAL: i32 = 147;
    pub const IAS_INVALID_FRIEND_CODE: i32 = 157;
    /// Device code parses but fails the friend code checksum.
    pub const IAS_FRIEND_CODE_REJECTED: i32 = 167;
    pub const IAS_ALREADY_REGISTERED: i32 = 177;
    pub const IAS_STORE_FAILURE: i32 = 187;
    /// Serial number is not on the configured whitelist.
    pub const IAS_NOT_WHITELISTED: i32 = 197;
}

/// Shop SOAP service errors.
#[derive(Error, Debug)]
pub enum SoapError {
    /// Request body is not well-formed XML or lacks a mandatory header field.
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// A required request key is absent.
    #[error("missing key: {0}")]
    MissingKey(String),

    /// A value failed enumeration or format validation.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Key material or binary templates are unusable. Raised only at startup.
    #[error("fatal configuration error: {0}")]
    ConfigurationFatal(String),

    #[error("XML serialization error: {0}")]
    Serialize(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoapError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

/// Failures reported by the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique row already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Opaque backend failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

pub type Result<T, E = SoapError> = std::result::Result<T, E>;
