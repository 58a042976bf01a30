//! # Error reporting
//!
//! Every failure in the message view is non-fatal. Operations report it
//! exactly once through an [`ErrorReporter`] and keep their last known
//! good state.

use std::fmt;

use crate::context::Context;

/// Failure reported to the user by the message view.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ViewError {
    /// The key directory could not be queried.
    #[error("Cannot look up key of {addr}")]
    Lookup {
        addr: String,
        #[source]
        cause: anyhow::Error,
    },

    /// The invitation service rejected the invitation or was unreachable.
    #[error("Cannot invite {addr}")]
    Invitation {
        addr: String,
        #[source]
        cause: anyhow::Error,
    },

    /// The bootstrap message for an accepted invitation could not be queued.
    #[error("Cannot queue invitation message to {addr}")]
    Enqueue {
        addr: String,
        #[source]
        cause: anyhow::Error,
    },

    /// The attachment content could not be fetched.
    #[error("Cannot fetch attachment {filename:?}")]
    AttachmentFetch {
        filename: String,
        #[source]
        cause: anyhow::Error,
    },

    /// The attachment content could not be written to disk.
    #[error("Cannot save attachment {filename:?}")]
    AttachmentSave {
        filename: String,
        #[source]
        cause: anyhow::Error,
    },
}

/// Process-wide sink for [`ViewError`]s.
///
/// Reporting is fire-and-forget, the reporter has no way to signal back.
pub trait ErrorReporter: fmt::Debug + Send + Sync {
    /// Hands the error over to the user-visible error presentation.
    fn report(&self, err: ViewError);
}

/// The default reporter emits [`crate::EventType::Error`] with the full error chain.
impl ErrorReporter for Context {
    fn report(&self, err: ViewError) {
        let err = anyhow::Error::new(err);
        error!(self, "{err:#}");
    }
}
