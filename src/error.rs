//! Error type for all functions

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
/// Global error type for submission, URC registry and transport setup errors
pub enum Error {
    #[error("port {0} out of range")]
    /// A port index that no `add_port` call ever returned
    InvalidPort(usize),

    #[error("command queue full on port {0}")]
    /// The per-port FIFO already holds `max_queue` commands
    QueueFull(usize),

    #[error("invalid transaction: {0}")]
    /// A transaction descriptor that fails validation (see
    /// [`crate::transaction::Transaction::validate`])
    InvalidTransaction(&'static str),

    #[error("urc table full on port {0}")]
    /// The per-port URC table already holds `max_urc_handlers` entries
    UrcTableFull(usize),

    #[error("urc prefix must not be empty")]
    /// An empty URC prefix was passed to register/unregister
    EmptyPrefix,

    #[error("urc prefix not registered")]
    /// Unregister did not find the given prefix
    UrcNotFound,

    #[error("io: {0}")]
    /// An IO error, based on std::io::Error
    Io(#[from] std::io::Error),

    #[error("serialport: {0}")]
    #[cfg(feature = "transport-serial")]
    /// A Serialport error, based on serialport::Error
    Serialport(#[from] serialport::Error),
}

/// Result type based on error::Error
pub type Result<T> = std::result::Result<T, Error>;
