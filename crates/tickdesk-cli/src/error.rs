use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] tickdesk_core::ValidationError),

    #[error("stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Serialization(_) => 4,
            Self::Stream(_) => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_exit_with_two() {
        let error = CliError::from(tickdesk_core::ValidationError::EmptySymbol);
        assert_eq!(error.exit_code(), 2);
        assert_eq!(CliError::Stream("refused".into()).exit_code(), 6);
    }
}
