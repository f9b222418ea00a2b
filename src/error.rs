//! Error taxonomy for the resolution pipeline.
//!
//! Only [`ErrorKind::Configuration`] is fatal. Every other kind is caught
//! inside the orchestrator and degrades a single lookup.

use thiserror::Error;

/// Result alias used across component boundaries.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Discriminant for [`ResolveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NetworkFailure,
    ParseFailure,
    InvalidInput,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIGURATION",
            ErrorKind::NetworkFailure => "NETWORK_FAILURE",
            ErrorKind::ParseFailure => "PARSE_FAILURE",
            ErrorKind::InvalidInput => "INVALID_INPUT",
        }
    }
}

/// Errors raised by resolver components.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network failure: {0}")]
    Network(#[source] anyhow::Error),

    #[error("Parse failure: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::Configuration(_) => ErrorKind::Configuration,
            ResolveError::Network(_) => ErrorKind::NetworkFailure,
            ResolveError::Parse(_) => ErrorKind::ParseFailure,
            ResolveError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// True when retrying can never succeed without operator intervention.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(ResolveError::Configuration("missing key".into()).is_fatal());
        assert!(!ResolveError::Network(anyhow::anyhow!("timeout")).is_fatal());
        assert!(!ResolveError::Parse("not an integer".into()).is_fatal());
        assert!(!ResolveError::InvalidInput("empty".into()).is_fatal());
    }

    #[test]
    fn test_kind_matches_variant() {
        let err = ResolveError::Parse("bad json".into());
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        assert_eq!(err.to_string(), "Parse failure: bad json");
    }
}
