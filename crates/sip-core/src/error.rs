use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or inspecting SIP messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A factory operation was called with input that violates its contract,
    /// e.g. a CANCEL built from a non-INVITE request. This is a programming
    /// error in the caller, not a runtime condition of the network.
    #[error("Protocol precondition violated: {0}")]
    ProtocolPrecondition(String),

    /// A header required by the operation is absent
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// Invalid SIP URI
    #[error("Invalid SIP URI: {0}")]
    InvalidUri(String),

    /// Invalid SIP method
    #[error("Invalid SIP method: {0}")]
    InvalidMethod(String),

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::ProtocolPrecondition(msg.into())
    }
}
