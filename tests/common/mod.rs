// Shared test doubles: a scripted capture device and a scripted dialog

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voicememo::audio::{
    AudioFrame, MediaConstraints, MediaDevices, MediaStream, MediaTrack, PlatformCapabilities,
    StreamEvent,
};
use voicememo::controller::{Dialog, Dismissed};
use voicememo::RecordingError;

pub const FRAME_SAMPLES: usize = 160;
pub const FRAME_PERIOD: Duration = Duration::from_millis(10);

/// How the scripted device answers `get_user_media`
#[derive(Debug, Clone)]
pub enum Answer {
    Grant,
    Deny(String),
    /// The permission prompt never closes
    Never,
}

/// Capture device that plays a 2kHz tone on a fixed schedule
pub struct ScriptedDevice {
    capabilities: PlatformCapabilities,
    ready_after: Duration,
    answer: Answer,
    frame_limit: Option<usize>,
    fail_after: Option<usize>,
    tracks: Mutex<Vec<MediaTrack>>,
    frames_sent: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    pub fn granting() -> Self {
        Self {
            capabilities: PlatformCapabilities::full(),
            ready_after: Duration::ZERO,
            answer: Answer::Grant,
            frame_limit: None,
            fail_after: None,
            tracks: Mutex::new(Vec::new()),
            frames_sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn denying(message: &str) -> Self {
        Self {
            answer: Answer::Deny(message.to_string()),
            ..Self::granting()
        }
    }

    pub fn never_answering() -> Self {
        Self {
            answer: Answer::Never,
            ..Self::granting()
        }
    }

    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Delay before the device answers
    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = delay;
        self
    }

    /// End the stream after this many frames
    pub fn frame_limit(mut self, frames: usize) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Report a device error after this many frames
    pub fn fail_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().clone()
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::SeqCst)
    }
}

fn tone_frame(index: usize) -> AudioFrame {
    // 2kHz at 16kHz sampling: 8 samples per period
    let samples = (0..FRAME_SAMPLES)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * 2000.0 * n as f32 / 16000.0;
            (phase.sin() * 8000.0) as i16
        })
        .collect();

    AudioFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: (index * 10) as u64,
    }
}

#[async_trait]
impl MediaDevices for ScriptedDevice {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, RecordingError> {
        tokio::time::sleep(self.ready_after).await;

        match &self.answer {
            Answer::Grant => {}
            Answer::Deny(message) => return Err(RecordingError::Acquisition(message.clone())),
            Answer::Never => std::future::pending::<()>().await,
        }

        let (tx, track, stream) =
            MediaStream::single_track("scripted", constraints.sample_rate, constraints.channels, 64);
        self.tracks.lock().push(track.clone());

        let frames_sent = Arc::clone(&self.frames_sent);
        let frame_limit = self.frame_limit;
        let fail_after = self.fail_after;

        tokio::spawn(async move {
            let mut index = 0;
            loop {
                tokio::time::sleep(FRAME_PERIOD).await;
                if track.is_stopped() {
                    break;
                }
                if frame_limit.is_some_and(|limit| index >= limit) {
                    break;
                }
                if fail_after.is_some_and(|limit| index >= limit) {
                    let _ = tx.send(StreamEvent::Error("device unplugged".to_string())).await;
                    break;
                }

                if tx.send(StreamEvent::Frame(tone_frame(index))).await.is_err() {
                    break;
                }
                frames_sent.fetch_add(1, Ordering::SeqCst);
                index += 1;
            }
        });

        Ok(stream)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Dialog that records what it was shown and answers as configured
pub struct ScriptedDialog {
    confirm: bool,
    shown: Mutex<Vec<(String, String, bool)>>,
}

impl ScriptedDialog {
    pub fn confirming() -> Self {
        Self {
            confirm: true,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn dismissing() -> Self {
        Self {
            confirm: false,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn shown(&self) -> Vec<(String, String, bool)> {
        self.shown.lock().clone()
    }
}

#[async_trait]
impl Dialog for ScriptedDialog {
    async fn show(&self, title: &str, body: &str, hide_cancel: bool) -> Result<(), Dismissed> {
        self.shown
            .lock()
            .push((title.to_string(), body.to_string(), hide_cancel));

        if self.confirm || hide_cancel {
            Ok(())
        } else {
            Err(Dismissed)
        }
    }
}
