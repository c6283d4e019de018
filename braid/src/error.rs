//! Errors raised and intercepted by the runtime.
//!
//! The runtime treats errors as opaque tagged values. One tag is reserved:
//! [`CANCEL_TAG`], carried by [`Error::Cancel`], which marks a computation
//! that was aborted because an enclosing cancellation scope was canceled.
//! Every other error is a user error and is propagated untouched.

use thiserror::Error;

/// Tag reserved for cancellation errors.
pub const CANCEL_TAG: &str = "Cancel";

/// An error raised inside, or by, the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An enclosing cancellation scope was canceled.
    #[error("operation canceled")]
    Cancel,

    /// An error raised by user code.
    #[error("{tag}: {payload}")]
    Raised { tag: String, payload: String },

    /// The root computation was abandoned without producing a value.
    #[error("computation was abandoned without producing a value")]
    Abandoned,

    /// The event loop ran out of work before the root computation finished.
    #[error("event loop went idle before the computation finished")]
    Stalled,
}

impl Error {
    /// Creates a user error with the given tag and payload.
    ///
    /// Using the reserved [`CANCEL_TAG`] produces [`Error::Cancel`], so a
    /// cancellation raised by hand is indistinguishable from one delivered
    /// by a scope.
    pub fn new(tag: impl Into<String>, payload: impl Into<String>) -> Self {
        let tag = tag.into();

        if tag == CANCEL_TAG {
            return Error::Cancel;
        }

        Error::Raised {
            tag,
            payload: payload.into(),
        }
    }

    /// Returns `true` for the reserved cancellation error.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Error::Cancel)
    }

    /// Returns the tag identifying this error.
    pub fn tag(&self) -> &str {
        match self {
            Error::Cancel => CANCEL_TAG,
            Error::Raised { tag, .. } => tag,
            Error::Abandoned => "Abandoned",
            Error::Stalled => "Stalled",
        }
    }
}

/// Result type used throughout the runtime.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_tag_builds_cancel() {
        let error = Error::new(CANCEL_TAG, "ignored");

        assert!(error.is_cancel());
        assert_eq!(error, Error::Cancel);
    }

    #[test]
    fn user_errors_keep_tag_and_payload() {
        let error = Error::new("io", "disk full");

        assert!(!error.is_cancel());
        assert_eq!(error.tag(), "io");
        assert_eq!(error.to_string(), "io: disk full");
    }

    #[test]
    fn runtime_errors_have_stable_tags() {
        assert_eq!(Error::Cancel.tag(), "Cancel");
        assert_eq!(Error::Abandoned.tag(), "Abandoned");
        assert_eq!(Error::Stalled.tag(), "Stalled");
    }
}
