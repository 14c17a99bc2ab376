//! Core error types for Cantus

use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for Cantus
///
/// The `NotFound`/`Unreadable` split matters: a lookup miss must be
/// distinguishable from a resource that exists but cannot be opened,
/// because callers preserve their current state on a miss.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Resource does not exist in any mounted location
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource exists but could not be opened or read
    #[error("Resource unreadable: {name}: {reason}")]
    Unreadable { name: String, reason: String },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a not found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an unreadable-resource error
    pub fn unreadable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreadable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a lookup miss (as opposed to an open failure)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable() {
        let miss = CoreError::not_found("bgm/theme");
        let broken = CoreError::unreadable("bgm/theme", "permission denied");

        assert!(miss.is_not_found());
        assert!(!broken.is_not_found());
    }

    #[test]
    fn error_messages_name_the_resource() {
        let err = CoreError::not_found("se/cursor");
        assert_eq!(err.to_string(), "Resource not found: se/cursor");

        let err = CoreError::unreadable("se/cursor", "corrupt header");
        assert_eq!(
            err.to_string(),
            "Resource unreadable: se/cursor: corrupt header"
        );
    }
}
