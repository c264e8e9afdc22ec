//! Error types shared by the recording pipeline and the memo store.

use thiserror::Error;

/// Errors produced by a recording session
///
/// Cancellation is not an error: a cancelled session completes with `None`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordingError {
    /// The capture device could not be opened (permission denied, no device)
    /// or the backend failed while the stream was live
    #[error("Failed to acquire audio stream: {0}")]
    Acquisition(String),

    /// The source node never became ready for an analyser
    #[error("Audio source not ready after {attempts} attempts")]
    AnalyserTimeout { attempts: u32 },

    /// The session reached a terminal state before the source node was ready
    #[error("Recording session closed before the audio source was ready")]
    SessionClosed,

    /// Buffered audio could not be assembled into a payload
    #[error("Failed to finalize recording: {0}")]
    Finalize(String),
}

impl RecordingError {
    /// Whether the user should be told the microphone is unavailable
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Self::Acquisition(_) | Self::Finalize(_))
    }
}

/// Errors produced by a memo store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Memo {0} not found")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
