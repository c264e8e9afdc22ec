pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod memo;
pub mod recording;

pub use audio::{
    select_backend, AudioFile, AudioFrame, AudioPayload, BackendKind, FileDevice, MediaDevices,
    MediaStream, PlatformCapabilities,
};
pub use config::Config;
pub use controller::{MemoController, RecordController, RecordingReport};
pub use error::{RecordingError, StoreError};
pub use http::{create_router, AppState};
pub use memo::{EventBus, FileMemoStore, Memo, MemoStore, Topic};
pub use recording::{RecordingSession, SessionState, VolumeLevel, VolumeTracker};
