use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EngineError {
    #[error("configuration incomplete: {0}")]
    ConfigIncomplete(String),
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("no recipients resolved: {0}")]
    NoRecipientsResolved(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("dispatch precondition failed: {0}")]
    DispatchPreconditionFailure(String),
    #[error("operation already in flight: {0}")]
    OperationInFlight(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Stable, machine-readable category for an [`EngineError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigIncomplete,
    TransportFailure,
    NoRecipientsResolved,
    MalformedResponse,
    DispatchPreconditionFailure,
    OperationInFlight,
    Validation,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigIncomplete => "config_incomplete",
            Self::TransportFailure => "transport_failure",
            Self::NoRecipientsResolved => "no_recipients_resolved",
            Self::MalformedResponse => "malformed_response",
            Self::DispatchPreconditionFailure => "dispatch_precondition_failure",
            Self::OperationInFlight => "operation_in_flight",
            Self::Validation => "validation",
        }
    }
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigIncomplete(_) => ErrorKind::ConfigIncomplete,
            Self::TransportFailure(_) => ErrorKind::TransportFailure,
            Self::NoRecipientsResolved(_) => ErrorKind::NoRecipientsResolved,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::DispatchPreconditionFailure(_) => ErrorKind::DispatchPreconditionFailure,
            Self::OperationInFlight(_) => ErrorKind::OperationInFlight,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// The message without the category prefix, suitable for a banner.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::ConfigIncomplete(message)
            | Self::TransportFailure(message)
            | Self::NoRecipientsResolved(message)
            | Self::MalformedResponse(message)
            | Self::DispatchPreconditionFailure(message)
            | Self::OperationInFlight(message)
            | Self::Validation(message) => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_are_stable_snake_case() {
        let err = EngineError::NoRecipientsResolved("nobody".to_string());
        assert_eq!(err.kind(), ErrorKind::NoRecipientsResolved);
        assert_eq!(err.kind().as_str(), "no_recipients_resolved");
        assert_eq!(err.detail(), "nobody");

        let json = serde_json::to_string(&ErrorKind::DispatchPreconditionFailure);
        assert_eq!(json.ok().as_deref(), Some("\"dispatch_precondition_failure\""));
    }

    #[test]
    fn display_includes_category_prefix() {
        let err = EngineError::MalformedResponse("missing field `bodyText`".to_string());
        assert_eq!(err.to_string(), "malformed response: missing field `bodyText`");
    }
}
