use thiserror::Error;

/// The error taxonomy consulted by every service and both dispatch surfaces.
///
/// `PolicyBlocked` is internal only: the Policy Gate turns it into a
/// simulated success response before it ever reaches a caller (see
/// `policy::trading_allowed` and the Trading Service).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("authentication token missing")]
    AuthMissing,

    #[error("authentication token invalid")]
    AuthInvalid,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("symbol list is empty or blank")]
    EmptySymbols,

    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("subscription limit reached")]
    SubLimit,

    #[error("upstream adapter failure: {0}")]
    UpstreamFailure(String),

    /// Never surfaced to a caller; see `policy::trading_allowed`.
    #[error("policy blocked this mutating call")]
    PolicyBlocked,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The taxonomy kind name, used by the dispatch layer's wire-format
    /// error code and by tests asserting on error shape.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::AuthMissing => "AUTH_MISSING",
            GatewayError::AuthInvalid => "AUTH_INVALID",
            GatewayError::InvalidArgument(_) => "INVALID_ARGUMENT",
            GatewayError::EmptySymbols => "EMPTY_SYMBOLS",
            GatewayError::FailedPrecondition(_) => "FAILED_PRECONDITION",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::SubLimit => "SUB_LIMIT",
            GatewayError::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            GatewayError::PolicyBlocked => "POLICY_BLOCKED",
            GatewayError::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_taxonomy_name() {
        assert_eq!(GatewayError::EmptySymbols.code(), "EMPTY_SYMBOLS");
        assert_eq!(GatewayError::SubLimit.code(), "SUB_LIMIT");
        assert_eq!(
            GatewayError::InvalidArgument("bad date".into()).code(),
            "INVALID_ARGUMENT"
        );
    }
}
