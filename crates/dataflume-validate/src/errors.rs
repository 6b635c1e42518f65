use thiserror::Error;

/// Errors raised when a malformed rule is created or compiled.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern for rule '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },
    #[error("invalid range for rule '{name}': {reason}")]
    InvalidRange { name: String, reason: String },
    #[error("unknown check '{check}' for rule '{name}'")]
    UnknownCheck { name: String, check: String },
}
