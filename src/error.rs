//! Error types for the tracking head library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File or socket I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Frame buffer does not match its declared geometry
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Detection capability failed for one frame
    #[error("Detection error: {0}")]
    Detection(String),

    /// Scratch buffer could not be allocated
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Wireless link could not be brought up
    #[error("Link initialization error: {0}")]
    LinkInit(String),

    /// A single datagram could not be sent
    #[error("Link send error: {0}")]
    LinkSend(String),

    /// Payload did not follow the wire format
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The other side of a stage channel is gone
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// An operation with a deadline ran out of time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A stage thread panicked
    #[error("Stage panicked: {0}")]
    StagePanicked(String),

    /// Display collaborator rejected a frame
    #[error("Display error: {0}")]
    Display(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
