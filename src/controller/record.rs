use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ports::{Dialog, Navigator};
use crate::audio::{AudioPayload, MediaDevices};
use crate::config::RecorderConfig;
use crate::error::RecordingError;
use crate::memo::{EventBus, Memo, MemoStore, Topic};
use crate::recording::{RecordingSession, SessionState, VolumeLevel, VolumeTrace, VolumeTracker};

const FAILURE_TITLE: &str = "Booooo!";
const FAILURE_BODY: &str = "There is a problem getting access to the microphone.";

/// How a recording ended from the controller's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingReport {
    /// Stored under this url
    Saved(String),
    Cancelled,
    Failed(RecordingError),
    /// Captured but the store rejected it
    Unsaved(String),
}

struct ActiveRecording {
    session: Arc<RecordingSession>,
    level: watch::Receiver<VolumeLevel>,
    done: JoinHandle<RecordingReport>,
}

/// Drives the record view: one session at a time, the live volume meter,
/// and persisting whatever the session delivers.
pub struct RecordController {
    devices: Arc<dyn MediaDevices>,
    store: Arc<dyn MemoStore>,
    bus: EventBus,
    navigator: Arc<dyn Navigator>,
    dialog: Arc<dyn Dialog>,
    config: RecorderConfig,
    active: Mutex<Option<ActiveRecording>>,
}

impl RecordController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        store: Arc<dyn MemoStore>,
        bus: EventBus,
        navigator: Arc<dyn Navigator>,
        dialog: Arc<dyn Dialog>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            devices,
            store,
            bus,
            navigator,
            dialog,
            config,
            active: Mutex::new(None),
        }
    }

    /// Start a new recording. Returns `false` if one is already running.
    pub fn start_recording(&self) -> bool {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            if current.session.state().is_active() {
                debug!("Recording already in progress");
                return false;
            }
        }

        let session = Arc::new(RecordingSession::start(self.devices.clone(), &self.config));
        info!("Recording started ({} backend)", session.kind().name());

        let (level_tx, level) = watch::channel(VolumeLevel::default());
        let tracker = VolumeTracker::from_config(&self.config);
        let volume = tokio::spawn(track_volume(session.clone(), tracker, level_tx));

        let done = tokio::spawn(handle_completion(
            session.clone(),
            volume,
            self.store.clone(),
            self.bus.clone(),
            self.navigator.clone(),
            self.dialog.clone(),
        ));

        *active = Some(ActiveRecording {
            session,
            level,
            done,
        });

        true
    }

    /// Finish the recording and keep the audio
    pub fn stop_recording(&self) {
        if let Some(current) = self.active.lock().as_ref() {
            if current.session.stop(false) {
                info!("Recording stopped");
            }
        }
    }

    /// Discard the recording and go back to the list
    pub fn cancel(&self) {
        if let Some(current) = self.active.lock().as_ref() {
            if current.session.stop(true) {
                info!("Recording cancelled");
            }
        }
        self.navigator.go("/");
    }

    /// The record view went away: stop and forget the session
    ///
    /// A recording in flight is still saved.
    pub fn hide(&self) {
        self.stop_recording();
        if self.active.lock().take().is_some() {
            debug!("Record view hidden");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|current| current.session.state().is_active())
            .unwrap_or(false)
    }

    pub fn state(&self) -> SessionState {
        self.active
            .lock()
            .as_ref()
            .map(|current| current.session.state())
            .unwrap_or_default()
    }

    /// Live volume of the current recording
    pub fn level(&self) -> Option<watch::Receiver<VolumeLevel>> {
        self.active.lock().as_ref().map(|current| current.level.clone())
    }

    /// Latest volume, zero when idle
    pub fn current_level(&self) -> VolumeLevel {
        match self.active.lock().as_ref() {
            Some(current) => *current.level.borrow(),
            None => VolumeLevel::default(),
        }
    }

    /// Wait for the current recording to be resolved and handled
    pub async fn finished(&self) -> Option<RecordingReport> {
        let current = self.active.lock().take()?;
        match current.done.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Recording task failed: {}", e);
                Some(RecordingReport::Failed(RecordingError::Finalize(e.to_string())))
            }
        }
    }
}

async fn track_volume(
    session: Arc<RecordingSession>,
    tracker: VolumeTracker,
    level_tx: watch::Sender<VolumeLevel>,
) -> VolumeTrace {
    match session.analyser().await {
        Ok(analyser) => {
            tracker
                .run(analyser, session.subscribe(), |level| {
                    level_tx.send_replace(level);
                })
                .await
        }
        Err(e) => {
            debug!("No volume data for this recording: {}", e);
            VolumeTrace::default()
        }
    }
}

async fn handle_completion(
    session: Arc<RecordingSession>,
    volume: JoinHandle<VolumeTrace>,
    store: Arc<dyn MemoStore>,
    bus: EventBus,
    navigator: Arc<dyn Navigator>,
    dialog: Arc<dyn Dialog>,
) -> RecordingReport {
    match session.complete().await {
        Ok(Some(payload)) => {
            let trace = volume.await.unwrap_or_else(|e| {
                warn!("Volume tracker failed: {}", e);
                VolumeTrace::default()
            });
            save_recording(payload, trace, store.as_ref(), &bus, navigator.as_ref()).await
        }
        Ok(None) => {
            volume.abort();
            debug!("Recording cancelled, nothing stored");
            RecordingReport::Cancelled
        }
        Err(e) => {
            volume.abort();
            error!("Recording failed: {}", e);

            if e.is_device_failure() && dialog.show(FAILURE_TITLE, FAILURE_BODY, true).await.is_ok() {
                session.stop(true);
            }

            RecordingReport::Failed(e)
        }
    }
}

async fn save_recording(
    payload: AudioPayload,
    trace: VolumeTrace,
    store: &dyn MemoStore,
    bus: &EventBus,
    navigator: &dyn Navigator,
) -> RecordingReport {
    let memo = Memo::new(payload, trace.normalized());

    if let Err(e) = store.put(&memo).await {
        error!("Failed to store memo {}: {}", memo.url, e);
        return RecordingReport::Unsaved(e.to_string());
    }

    info!(
        "Saved memo {} ({} audio bytes, {} volume samples)",
        memo.url,
        memo.audio.len(),
        memo.volume_data.len()
    );

    bus.publish(Topic::MemoUpdated);
    navigator.go(&format!("/edit/{}", memo.url));

    RecordingReport::Saved(memo.url)
}
