use crate::transaction::TransactionKey;
use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transaction handling
#[derive(Error, Debug)]
pub enum Error {
    /// Error originating from the sip-core crate (building messages, preconditions)
    #[error("SIP core error: {0}")]
    SipCore(#[from] sipxact_sip_core::Error),

    /// Transaction not found for the given key.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    /// Transaction with the given key already exists.
    #[error("Transaction already exists: {0}")]
    TransactionExists(TransactionKey),

    /// A message carries no usable transaction identifier (no Via/branch, no CSeq).
    #[error("No transaction id: {0}")]
    NoTransactionId(String),

    /// Configuration rejected by `validate()`.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal channel error (e.g., receiver dropped).
    #[error("Internal channel closed")]
    ChannelClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}
