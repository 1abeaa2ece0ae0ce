use std::io;

/// Error taxonomy for the mux layer, per the design's error handling section.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed frame or unexpected state transition from the peer. Fatal to
    /// the carrier; the owning [`crate::manager::Manager`] closes.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation invoked after the manager closed.
    #[error("manager closed")]
    ManagerClosed,

    /// Deadline exceeded during handshake/open/accept.
    #[error("timed out")]
    Timeout,

    /// Stream-local I/O error after a successful open.
    #[error("broken pipe")]
    BrokenPipe,

    /// The underlying carrier returned an I/O error.
    #[error("carrier I/O error: {0}")]
    Io(#[from] io::Error),

    /// The calling operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// `true` for errors that mean "the thing the caller was waiting on died",
    /// as opposed to a local programming error.
    #[must_use]
    pub fn is_fatal_to_peer(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
