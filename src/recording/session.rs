use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::SessionState;
use crate::audio::{
    select_backend, Analyser, BackendKind, CaptureBackend, CaptureConfig, CaptureHandle,
    CaptureOutcome, MediaDevices,
};
use crate::config::RecorderConfig;
use crate::error::RecordingError;

/// Awaitable end state of a session. Clones resolve to the same outcome.
pub type Completion = Shared<BoxFuture<'static, CaptureOutcome>>;

/// One recording attempt
///
/// Picks a capture backend from the device's capability probe, starts
/// acquiring the stream immediately and exposes a single completion for
/// the result. Create a new session for every attempt.
pub struct RecordingSession {
    kind: BackendKind,
    handle: CaptureHandle,
    completion: Completion,
    state: watch::Receiver<SessionState>,
    poll_interval: Duration,
    poll_attempts: u32,
    fft_size: usize,
    smoothing: f32,
}

impl RecordingSession {
    /// Start a session. Must be called from within a tokio runtime.
    pub fn start(devices: Arc<dyn MediaDevices>, config: &RecorderConfig) -> Self {
        let kind = select_backend(devices.capabilities());
        info!("Using {} capture backend", kind.name());

        let capture_config = CaptureConfig::from(config);
        let backend = CaptureBackend::new(kind, &capture_config);
        let (handle, outcome, state) = backend.acquire(devices, &capture_config);

        let completion = async move {
            outcome.await.unwrap_or_else(|_| {
                Err(RecordingError::Finalize("capture task ended without an outcome".to_string()))
            })
        }
        .boxed()
        .shared();

        Self {
            kind,
            handle,
            completion,
            state,
            poll_interval: config.poll_interval(),
            poll_attempts: config.poll_attempts,
            fft_size: config.fft_size,
            smoothing: config.smoothing,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Resolves once with the payload, `None` for a cancelled recording, or
    /// an acquisition error
    pub fn complete(&self) -> Completion {
        self.completion.clone()
    }

    /// Request the end of the recording. `cancel` discards the audio.
    /// Returns `false` when a stop was already requested.
    pub fn stop(&self, cancel: bool) -> bool {
        self.handle.stop(cancel)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// Watch the session's lifecycle
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait for the audio source, then tap it with a new analyser
    ///
    /// Checks every `poll_interval` up to `poll_attempts` times. Gives up
    /// early with `SessionClosed` once the session has ended.
    pub async fn analyser(&self) -> Result<Analyser, RecordingError> {
        for attempt in 1..=self.poll_attempts {
            if let Some(source) = self.handle.source_node() {
                debug!(attempt, "Audio source ready");
                return Ok(Analyser::connect(&source, self.fft_size, self.smoothing));
            }

            if self.state().is_terminal() {
                debug!("Session ended before the audio source was ready");
                return Err(RecordingError::SessionClosed);
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        warn!(
            "Audio source not ready after {} attempts, giving up on the analyser",
            self.poll_attempts
        );
        Err(RecordingError::AnalyserTimeout {
            attempts: self.poll_attempts,
        })
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.state().is_active() && self.handle.stop(true) {
            debug!("Recording session dropped while active, cancelled");
        }
    }
}

