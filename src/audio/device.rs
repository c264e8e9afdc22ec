// Capture device abstraction
//
// A `MediaDevices` implementation opens an input stream on request. The
// stream delivers `StreamEvent`s over a channel and owns one or more tracks;
// stopping the tracks tells the producer to release the device.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::backend::AudioFrame;
use crate::error::RecordingError;

/// What the platform's recording facility supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformCapabilities {
    /// A native encoder-backed recorder exists
    pub media_recorder: bool,
    /// The recorder can answer "can you record this mime type?"
    pub mime_type_query: bool,
}

impl PlatformCapabilities {
    /// Capabilities of a complete recorder implementation
    pub fn full() -> Self {
        Self {
            media_recorder: true,
            mime_type_query: true,
        }
    }

    /// No recorder facility at all
    pub fn none() -> Self {
        Self::default()
    }
}

/// Requested stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Item delivered by a live stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Frame(AudioFrame),
    /// The device failed while capturing
    Error(String),
}

#[derive(Debug, Default)]
struct TrackState {
    stopped: AtomicBool,
    stop_calls: AtomicUsize,
}

/// Handle to one device track
///
/// Clones share state, so a producer can watch for `stop()` issued by the
/// stream's owner.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    label: String,
    state: Arc<TrackState>,
}

impl MediaTrack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Arc::new(TrackState::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stop(&self) {
        self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.state.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Number of times `stop()` was called on this track
    pub fn stop_count(&self) -> usize {
        self.state.stop_calls.load(Ordering::SeqCst)
    }
}

/// An acquired input stream
pub struct MediaStream {
    events: mpsc::Receiver<StreamEvent>,
    tracks: Vec<MediaTrack>,
    sample_rate: u32,
    channels: u16,
    released: bool,
}

impl MediaStream {
    pub fn new(
        events: mpsc::Receiver<StreamEvent>,
        tracks: Vec<MediaTrack>,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        Self {
            events,
            tracks,
            sample_rate,
            channels,
            released: false,
        }
    }

    /// Create a single-track stream plus the producer side of its channel
    pub fn single_track(
        label: impl Into<String>,
        sample_rate: u32,
        channels: u16,
        capacity: usize,
    ) -> (mpsc::Sender<StreamEvent>, MediaTrack, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let track = MediaTrack::new(label);
        let stream = Self::new(rx, vec![track.clone()], sample_rate, channels);
        (tx, track, stream)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub(crate) async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub(crate) fn try_next_event(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    /// Stop every track. Returns `false` if the stream was already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }

        for track in &self.tracks {
            track.stop();
        }
        self.released = true;

        debug!("Released {} media track(s)", self.tracks.len());

        true
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Source of capture streams
///
/// Implementations:
/// - `FileDevice`: plays an audio file out in real time
/// - `MicrophoneDevice`: default input device via cpal (`microphone` feature)
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Feature probe used to pick a capture backend
    fn capabilities(&self) -> PlatformCapabilities;

    /// Open an input stream. May wait on a permission prompt.
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, RecordingError>;

    /// Device name for logging
    fn name(&self) -> &str;
}
