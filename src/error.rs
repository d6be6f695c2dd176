//! Errors raised by printer sessions and the registry.

use std::time::Duration;

/// Everything that can go wrong between a named printer and its client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The client never reported ready before the deadline. Retry with
    /// another connect.
    #[error("printer did not report ready within {0:?}")]
    ConnectTimeout(Duration),

    /// The client could not be created or failed its handshake.
    #[error("connect failed: {0}")]
    Connect(anyhow::Error),

    /// The session is not `Ready`.
    #[error("printer is not connected")]
    NotReady,

    /// No printer is configured under this name.
    #[error("unknown printer '{0}'")]
    UnknownPrinter(String),

    /// Two printers were configured under the same name.
    #[error("duplicate printer name '{0}'")]
    DuplicateName(String),

    /// There are no printers to manage.
    #[error("no printers configured")]
    NoPrinters,

    /// The printer exposes no camera this bridge can stream.
    #[error("camera is not available on this printer")]
    CameraUnavailable,

    /// The camera source failed after the stream was opened.
    #[error("camera stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The printer client failed to carry out a command.
    #[error("printer error: {0}")]
    Client(anyhow::Error),
}

/// Result type defaulting to this crate's [Error].
pub type Result<T, E = Error> = std::result::Result<T, E>;
