//! Error types for the realtime client runtime.

use thiserror::Error;

pub type AriaResult<T> = Result<T, AriaError>;

/// Top-level error surfaced to the caller.
///
/// Decode errors and benign transient server errors are handled internally
/// and never reach this type; only protocol invariant violations, resolver
/// misconfiguration, and transport failures escape the pipeline.
#[derive(Debug, Error)]
pub enum AriaError {
    #[error("audio format under-specified: {0}")]
    AudioFormatUnderSpecified(String),

    #[error("audio format over-specified: {0}")]
    AudioFormatOverSpecified(String),

    #[error("audio paging unresolvable: {0}")]
    AudioPagingUnresolvable(String),

    #[error("protocol invariant violated: {0}")]
    ProtocolViolation(String),

    #[error("connection closed abnormally: {0}")]
    ConnectionClosed(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("recording file I/O error: {0}")]
    Recording(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
