//! Error taxonomy shared across the gateway.
//!
//! Every public operation resolves to one of these kinds; the integer
//! values are the JSON-RPC `error.code` representation on the wire.

use thiserror::Error;

/// The result type used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Closed error taxonomy for all gateway operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayError {
    /// Unspecified failure.
    #[error("general failure")]
    General,
    /// A request or handshake timed out.
    #[error("timed out")]
    Timedout,
    /// No transport is available for the operation.
    #[error("not connected")]
    NotConnected,
    /// `connect` was called while a connection is already established.
    #[error("already connected")]
    AlreadyConnected,
    /// JSON-RPC invalid request.
    #[error("invalid request")]
    InvalidRequest,
    /// JSON-RPC method not found.
    #[error("method not found")]
    MethodNotFound,
    /// JSON-RPC invalid parameters.
    #[error("invalid parameters")]
    InvalidParams,
    /// Platform capability is not available.
    #[error("capability not available")]
    CapabilityNotAvailable,
    /// Platform capability state could not be retrieved.
    #[error("capability get error")]
    CapabilityGetError,
    /// Platform capability is not supported.
    #[error("capability not supported")]
    CapabilityNotSupported,
    /// Platform capability use is not permitted.
    #[error("capability not permitted")]
    CapabilityNotPermitted,
}

impl GatewayError {
    /// Map an inbound `error.code` onto the taxonomy.
    ///
    /// Unknown codes collapse to [`GatewayError::General`].
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::General,
            2 => Self::Timedout,
            3 => Self::NotConnected,
            4 => Self::AlreadyConnected,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -50300 => Self::CapabilityNotAvailable,
            -50200 => Self::CapabilityGetError,
            -50100 => Self::CapabilityNotSupported,
            -40300 => Self::CapabilityNotPermitted,
            _ => Self::General,
        }
    }

    /// The wire representation of this error kind.
    pub fn code(&self) -> i64 {
        match self {
            Self::General => 1,
            Self::Timedout => 2,
            Self::NotConnected => 3,
            Self::AlreadyConnected => 4,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::CapabilityNotAvailable => -50300,
            Self::CapabilityGetError => -50200,
            Self::CapabilityNotSupported => -50100,
            Self::CapabilityNotPermitted => -40300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        let all = [
            GatewayError::General,
            GatewayError::Timedout,
            GatewayError::NotConnected,
            GatewayError::AlreadyConnected,
            GatewayError::InvalidRequest,
            GatewayError::MethodNotFound,
            GatewayError::InvalidParams,
            GatewayError::CapabilityNotAvailable,
            GatewayError::CapabilityGetError,
            GatewayError::CapabilityNotSupported,
            GatewayError::CapabilityNotPermitted,
        ];
        for kind in all {
            assert_eq!(GatewayError::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn test_unknown_code_maps_to_general() {
        assert_eq!(GatewayError::from_code(0), GatewayError::General);
        assert_eq!(GatewayError::from_code(9999), GatewayError::General);
        assert_eq!(GatewayError::from_code(-1), GatewayError::General);
    }

    #[test]
    fn test_display() {
        assert_eq!(GatewayError::Timedout.to_string(), "timed out");
        assert_eq!(GatewayError::NotConnected.to_string(), "not connected");
    }
}
