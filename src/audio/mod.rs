pub mod analyser;
pub mod backend;
pub mod chunk;
pub mod convert;
pub mod device;
pub mod file;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use analyser::{Analyser, SourceNode};
pub use backend::{
    select_backend, AudioFrame, AudioPayload, BackendKind, CaptureBackend, CaptureConfig, CaptureHandle,
    CaptureOutcome,
};
pub use chunk::{encode_wav, BufferedRecorder, ChunkedRecorder, WAV_MIME_TYPE};
pub use device::{MediaConstraints, MediaDevices, MediaStream, MediaTrack, PlatformCapabilities, StreamEvent};
pub use file::{AudioFile, FileDevice};

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneDevice;
