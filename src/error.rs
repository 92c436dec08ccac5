// ============================================================================
// File: src/error.rs
// Error taxonomy shared by every tool
// ============================================================================

use thiserror::Error;

/// Everything that can go wrong while serving one tool action.
///
/// `Display` is the exact string shown to the user, so each variant carries
/// its own prefix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    /// Empty or invalid input, caught before any network call.
    #[error("{0}")]
    Validation(String),

    /// The remote service populated its own error field.
    #[error("Error: {0}")]
    Remote(String),

    /// The call succeeded but no usable output shape was found.
    #[error("{0}")]
    Extraction(String),

    /// Network or runtime failure during the call.
    #[error("Service error: {0}")]
    Transport(String),

    #[error("File is too large ({size_mib:.1} MiB). The maximum size is {limit_mib} MiB.")]
    FileTooLarge { size_mib: f64, limit_mib: u64 },

    #[error("Please provide a valid WAV file (got {0})")]
    UnsupportedFile(String),

    #[error("Failed to convert WAV to MP3. {0}")]
    Transcode(String),
}

impl ToolError {
    /// Builds a transport error, falling back to a generic message when the
    /// underlying cause has none.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            ToolError::Transport("Unknown error".to_string())
        } else {
            ToolError::Transport(message)
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ToolError::Validation(_) | ToolError::FileTooLarge { .. } | ToolError::UnsupportedFile(_)
        )
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ToolError::transport("The request timed out. Please try again.")
        } else {
            ToolError::transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_prefixed() {
        let err = ToolError::Remote("model overloaded".to_string());
        assert_eq!(err.to_string(), "Error: model overloaded");
    }

    #[test]
    fn transport_falls_back_to_generic_message() {
        assert_eq!(ToolError::transport("  ").to_string(), "Service error: Unknown error");
        assert_eq!(
            ToolError::transport("connection reset").to_string(),
            "Service error: connection reset"
        );
    }

    #[test]
    fn file_errors_are_distinguishable() {
        let too_large = ToolError::FileTooLarge { size_mib: 150.0, limit_mib: 100 };
        let wrong_type = ToolError::UnsupportedFile("song.mp3".to_string());
        assert!(too_large.to_string().contains("too large"));
        assert!(wrong_type.to_string().contains("valid WAV"));
        assert!(too_large.is_local() && wrong_type.is_local());
        assert!(!ToolError::Remote("x".into()).is_local());
    }
}
