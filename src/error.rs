use thiserror::Error;

/// Failures raised by a server round-trip or by the connection layer.
///
/// Validation problems never show up here; they are reported as
/// [`ConfigProblem`](crate::parts::ConfigProblem) data instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum P4Error {
    /// The connection is offline, or the server could not be reached.
    #[error("not connected to the Perforce server")]
    Disconnected,

    /// The server refused the supplied credentials.
    #[error("authentication failed for {server}: {message}")]
    Authentication { server: String, message: String },

    /// A transport level failure (timeouts, refused connections, resets).
    #[error("connection problem: {0}")]
    Connection(String),

    /// The server understood the request and refused it.
    #[error("server rejected the request: {0}")]
    Rejected(String),

    /// The operation was interrupted before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// A condition that can only be reached through a defect in this crate.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl P4Error {
    /// True when the failure means the server is out of reach.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, P4Error::Disconnected | P4Error::Connection(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, P4Error::Authentication { .. })
    }
}

/// Result type for connection layer operations
pub type P4Result<T> = std::result::Result<T, P4Error>;
