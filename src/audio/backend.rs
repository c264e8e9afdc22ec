use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::analyser::SourceNode;
use super::chunk::{BufferedRecorder, ChunkedRecorder};
use super::convert::FrameConformer;
use super::device::{MediaConstraints, MediaDevices, MediaStream, PlatformCapabilities, StreamEvent};
use crate::config::RecorderConfig;
use crate::error::RecordingError;
use crate::recording::SessionState;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Finished recording, ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Outcome of one capture: a payload, or `None` when cancelled
pub type CaptureOutcome = Result<Option<AudioPayload>, RecordingError>;

/// Which capture backend a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Encoder-backed recorder flushing time-sliced fragments
    Streaming,
    /// Raw sample buffer encoded once on stop
    Buffered,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Buffered => "buffered",
        }
    }
}

/// Pick a backend from the platform probe
///
/// The streaming backend needs a recorder that can also be queried for mime
/// type support; a recorder without the query is treated as incomplete.
pub fn select_backend(capabilities: PlatformCapabilities) -> BackendKind {
    if capabilities.media_recorder && capabilities.mime_type_query {
        BackendKind::Streaming
    } else {
        BackendKind::Buffered
    }
}

/// Capture parameters for a backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub timeslice_ms: u64,
    /// Samples kept by the source node for analysers
    pub analyser_window: usize,
}

impl From<&RecorderConfig> for CaptureConfig {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            timeslice_ms: config.timeslice_ms,
            analyser_window: config.fft_size.max(32) * 2,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from(&RecorderConfig::default())
    }
}

/// Capture backend. Owns the device stream and the recorded audio.
#[derive(Debug)]
pub enum CaptureBackend {
    Streaming(ChunkedRecorder),
    Buffered(BufferedRecorder),
}

impl CaptureBackend {
    pub fn new(kind: BackendKind, config: &CaptureConfig) -> Self {
        match kind {
            BackendKind::Streaming => Self::Streaming(ChunkedRecorder::new(
                config.sample_rate,
                config.channels,
                config.timeslice_ms,
            )),
            BackendKind::Buffered => Self::Buffered(BufferedRecorder::new(config.sample_rate, config.channels)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Streaming(_) => BackendKind::Streaming,
            Self::Buffered(_) => BackendKind::Buffered,
        }
    }

    fn push(&mut self, frame: &AudioFrame) {
        match self {
            Self::Streaming(recorder) => recorder.push(frame),
            Self::Buffered(recorder) => recorder.push(frame),
        }
    }

    fn discard(&mut self) {
        match self {
            Self::Streaming(recorder) => recorder.discard(),
            Self::Buffered(recorder) => recorder.discard(),
        }
    }

    fn finish(self) -> Result<AudioPayload, RecordingError> {
        match self {
            Self::Streaming(recorder) => recorder.finish(),
            Self::Buffered(recorder) => recorder.finish(),
        }
    }

    /// Request the device stream and start capturing in a background task
    ///
    /// Returns the control handle, the outcome receiver (resolved exactly
    /// once) and the lifecycle state.
    pub fn acquire(
        self,
        devices: Arc<dyn MediaDevices>,
        config: &CaptureConfig,
    ) -> (CaptureHandle, oneshot::Receiver<CaptureOutcome>, watch::Receiver<SessionState>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let source = Arc::new(OnceLock::new());

        let task = CaptureTask {
            backend: self,
            constraints: MediaConstraints {
                sample_rate: config.sample_rate,
                channels: config.channels,
            },
            analyser_window: config.analyser_window,
            control: control_rx,
            source: Arc::clone(&source),
            state: state_tx,
        };

        tokio::spawn(async move {
            let outcome = task.run(devices).await;
            if outcome_tx.send(outcome).is_err() {
                debug!("Capture outcome dropped: session already gone");
            }
        });

        let handle = CaptureHandle {
            control: control_tx,
            stop_requested: AtomicBool::new(false),
            source,
        };

        (handle, outcome_rx, state_rx)
    }
}

#[derive(Debug, Clone, Copy)]
struct StopRequest {
    delete_pending: bool,
}

/// Caller side of a running capture
#[derive(Debug)]
pub struct CaptureHandle {
    control: mpsc::UnboundedSender<StopRequest>,
    stop_requested: AtomicBool,
    source: Arc<OnceLock<Arc<SourceNode>>>,
}

impl CaptureHandle {
    /// Ask the backend to finish. Only the first call has any effect;
    /// returns whether this call was it.
    pub fn stop(&self, delete_pending: bool) -> bool {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!("Stop already requested, ignoring");
            return false;
        }

        if self.control.send(StopRequest { delete_pending }).is_err() {
            debug!("Capture task already finished");
        }

        true
    }

    /// The audio graph node, once the stream has been acquired
    pub fn source_node(&self) -> Option<Arc<SourceNode>> {
        self.source.get().cloned()
    }
}

struct CaptureTask {
    backend: CaptureBackend,
    constraints: MediaConstraints,
    analyser_window: usize,
    control: mpsc::UnboundedReceiver<StopRequest>,
    source: Arc<OnceLock<Arc<SourceNode>>>,
    state: watch::Sender<SessionState>,
}

impl CaptureTask {
    // A closed control channel means every handle is gone: nobody can stop
    // the capture any more, so it is treated as a cancel.
    fn delete_pending(request: Option<StopRequest>) -> bool {
        request.map_or(true, |r| r.delete_pending)
    }

    async fn run(mut self, devices: Arc<dyn MediaDevices>) -> CaptureOutcome {
        let kind = self.backend.kind();
        self.state.send_replace(SessionState::Acquiring);

        info!("Acquiring {} stream from {}", kind.name(), devices.name());

        // A stop issued while the permission prompt is open is latched and
        // applied once the device answers.
        let mut latched: Option<bool> = None;
        let acquired = {
            let acquire = devices.get_user_media(&self.constraints);
            tokio::pin!(acquire);

            loop {
                tokio::select! {
                    result = &mut acquire => break result,
                    request = self.control.recv(), if latched.is_none() => {
                        let delete_pending = Self::delete_pending(request);
                        debug!(delete_pending, "Stop requested during acquisition");
                        latched = Some(delete_pending);
                    }
                }
            }
        };

        let mut stream = match acquired {
            Ok(stream) => stream,
            Err(e) if latched == Some(true) => {
                info!("Acquisition failed after cancel, discarding error: {}", e);
                self.state.send_replace(SessionState::Resolved);
                return Ok(None);
            }
            Err(e) => {
                error!("Failed to acquire audio stream: {}", e);
                self.state.send_replace(SessionState::Failed);
                return Err(e);
            }
        };

        let mut conformer = match FrameConformer::new(stream.sample_rate(), stream.channels(), self.constraints) {
            Ok(conformer) => conformer,
            Err(e) => {
                error!("Cannot record from this stream: {}", e);
                stream.release();
                self.state.send_replace(SessionState::Failed);
                return Err(e);
            }
        };

        if let Some(delete_pending) = latched {
            return self.finish(stream, conformer, delete_pending);
        }

        let source = Arc::new(SourceNode::new(self.constraints.sample_rate, self.analyser_window));
        if self.source.set(Arc::clone(&source)).is_err() {
            warn!("Source node already set");
        }

        self.state.send_replace(SessionState::Recording);
        info!(
            "Recording started ({} backend, device {}Hz x{}, recording {}Hz x{})",
            kind.name(),
            stream.sample_rate(),
            stream.channels(),
            self.constraints.sample_rate,
            self.constraints.channels
        );

        let mut stream_ended = false;
        let delete_pending = loop {
            tokio::select! {
                biased;

                request = self.control.recv() => break Self::delete_pending(request),

                event = stream.next_event(), if !stream_ended => match event {
                    Some(StreamEvent::Frame(frame)) => match conformer.conform(frame) {
                        Ok(Some(frame)) => {
                            source.feed(&frame);
                            self.backend.push(&frame);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("Failed to convert audio frame: {}", e);
                            stream.release();
                            self.state.send_replace(SessionState::Failed);
                            return Err(e);
                        }
                    },
                    Some(StreamEvent::Error(message)) => {
                        error!("Audio stream error: {}", message);
                        stream.release();
                        self.state.send_replace(SessionState::Failed);
                        return Err(RecordingError::Acquisition(message));
                    }
                    None => {
                        warn!("Audio stream ended, waiting for stop");
                        stream_ended = true;
                    }
                },
            }
        };

        self.finish(stream, conformer, delete_pending)
    }

    fn finish(mut self, mut stream: MediaStream, mut conformer: FrameConformer, delete_pending: bool) -> CaptureOutcome {
        if delete_pending {
            self.state.send_replace(SessionState::StoppingCancel);
            stream.release();
            self.backend.discard();
            self.state.send_replace(SessionState::Resolved);

            info!("Recording cancelled");
            return Ok(None);
        }

        self.state.send_replace(SessionState::StoppingFinalize);
        stream.release();

        // Frames the device queued before its tracks stopped, then whatever
        // the resampler still holds
        let mut tail = Vec::new();
        while let Some(StreamEvent::Frame(frame)) = stream.try_next_event() {
            tail.push(conformer.conform(frame));
        }
        tail.push(conformer.flush());

        for frame in tail {
            match frame {
                Ok(Some(frame)) => self.backend.push(&frame),
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to convert trailing audio: {}", e);
                    self.state.send_replace(SessionState::Failed);
                    return Err(e);
                }
            }
        }

        match self.backend.finish() {
            Ok(payload) => {
                self.state.send_replace(SessionState::Resolved);
                info!("Recording finalized: {} bytes ({})", payload.len(), payload.mime_type);
                Ok(Some(payload))
            }
            Err(e) => {
                error!("Failed to finalize recording: {}", e);
                self.state.send_replace(SessionState::Failed);
                Err(e)
            }
        }
    }
}
