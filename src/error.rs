use strum::{Display, EnumString};
use thiserror::Error;

use crate::audit::ApiOperation;

/// Window could not be established. No backend call was charged for any of
/// these, so none of them show up in the audit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolErrorCode {
    PgNotFound,
    UnknownWindowType,
    NoPaymentUrl,
    PopupBlocked,
}

/// The attempt resolved negatively after a window was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthFailureCode {
    AuthFailed,
    UserCancel,
    Timeout,
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Caller input was rejected before anything reached the backend.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation was called in a lifecycle state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("payment window could not be opened [{code}]: {message}")]
    Protocol {
        code: ProtocolErrorCode,
        message: String,
    },

    #[error("authentication failed [{code}]: {message}")]
    AuthenticationFailed {
        code: AuthFailureCode,
        message: String,
        /// Raw query string the gateway sent back, kept for diagnostics.
        query_string: Option<String>,
    },

    /// The backend answered with a non-zero result code. Carries the server's
    /// message verbatim.
    #[error("{} rejected by backend [{code}]: {message}", .operation.label())]
    BackendRejected {
        operation: ApiOperation,
        code: String,
        message: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheckoutError {
    pub fn validation(message: impl Into<String>) -> Self {
        CheckoutError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CheckoutError::InvalidState(message.into())
    }

    pub fn protocol(code: ProtocolErrorCode, message: impl Into<String>) -> Self {
        CheckoutError::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        CheckoutError::Network(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_rejection_names_the_operation() {
        let err = CheckoutError::BackendRejected {
            operation: ApiOperation::Approve,
            code: "2002".to_string(),
            message: "declined".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "payment approval rejected by backend [2002]: declined"
        );
    }

    #[test]
    fn protocol_codes_render_screaming_snake() {
        assert_eq!(ProtocolErrorCode::PgNotFound.to_string(), "PG_NOT_FOUND");
        assert_eq!(ProtocolErrorCode::PopupBlocked.to_string(), "POPUP_BLOCKED");
        assert_eq!(AuthFailureCode::UserCancel.to_string(), "USER_CANCEL");
        assert_eq!(AuthFailureCode::Timeout.to_string(), "TIMEOUT");
    }
}
