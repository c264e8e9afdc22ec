// Live microphone capture via cpal
//
// cpal streams are not `Send`, so each acquired stream lives on its own
// thread until the track is stopped. The stream delivers the device's
// native format; the capture task converts it.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::AudioFrame;
use super::convert::f32_to_i16;
use super::device::{MediaConstraints, MediaDevices, MediaStream, MediaTrack, PlatformCapabilities, StreamEvent};
use crate::error::RecordingError;

const RELEASE_POLL: Duration = Duration::from_millis(20);

/// Default input device of the default host
pub struct MicrophoneDevice {
    capabilities: PlatformCapabilities,
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self {
            capabilities: PlatformCapabilities::full(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn acquisition_error(context: &str, e: impl std::fmt::Display) -> RecordingError {
    RecordingError::Acquisition(format!("{}: {}", context, e))
}

struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
    sample_rate: u32,
    channels: u16,
    emitted: u64,
    dropped: Arc<AtomicU64>,
}

impl Emitter {
    fn emit(&mut self, samples: Vec<i16>) {
        let timestamp_ms = self.emitted * 1000 / u64::from(self.sample_rate.max(1));
        self.emitted += (samples.len() / usize::from(self.channels.max(1))) as u64;

        let frame = AudioFrame {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp_ms,
        };

        // The audio callback must never block
        if self.tx.try_send(StreamEvent::Frame(frame)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// What the audio callbacks report back to the capture thread
#[derive(Default)]
struct Health {
    dropped: Arc<AtomicU64>,
    error: Mutex<Option<String>>,
}

impl Health {
    /// Surface callback trouble from the capture thread. Returns `false`
    /// once the stream has failed.
    fn check(&self, tx: &mpsc::Sender<StreamEvent>, reported_drops: &mut u64) -> bool {
        self.report_drops(reported_drops);

        match self.error.lock().take() {
            Some(message) => {
                if tx.blocking_send(StreamEvent::Error(message)).is_err() {
                    info!("Stream error after the session went away");
                }
                false
            }
            None => true,
        }
    }

    fn report_drops(&self, reported_drops: &mut u64) {
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > *reported_drops {
            warn!("Dropped {} audio frames, capture channel full", dropped - *reported_drops);
            *reported_drops = dropped;
        }
    }
}

fn run_stream(
    constraints: MediaConstraints,
    tx: mpsc::Sender<StreamEvent>,
    track: MediaTrack,
    ready: oneshot::Sender<Result<(u32, u16), RecordingError>>,
) {
    let health = Arc::new(Health::default());

    let result: Result<(cpal::Stream, u32, u16), RecordingError> = (|| {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| RecordingError::Acquisition("No input device available".to_string()))?;

        info!("Using input device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));

        let supported = device
            .default_input_config()
            .map_err(|e| acquisition_error("Failed to get input config", e))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let err_health = Arc::clone(&health);
        let err_fn = move |err: cpal::StreamError| {
            error!("Audio input stream error: {}", err);
            err_health.error.lock().get_or_insert_with(|| err.to_string());
        };

        let mut emitter = Emitter {
            tx: tx.clone(),
            sample_rate,
            channels,
            emitted: 0,
            dropped: Arc::clone(&health.dropped),
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    emitter.emit(data.iter().map(|&s| f32_to_i16(s)).collect());
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    emitter.emit(data.to_vec());
                },
                err_fn,
                None,
            ),
            other => {
                return Err(RecordingError::Acquisition(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| acquisition_error("Failed to open input stream", e))?;

        stream
            .play()
            .map_err(|e| acquisition_error("Failed to start input stream", e))?;

        Ok((stream, sample_rate, channels))
    })();

    match result {
        Ok((stream, sample_rate, channels)) => {
            info!(
                "Microphone open at {}Hz x{} (requested {}Hz x{})",
                sample_rate, channels, constraints.sample_rate, constraints.channels
            );
            if ready.send(Ok((sample_rate, channels))).is_err() {
                return;
            }

            let mut reported_drops = 0;
            while !track.is_stopped() && !tx.is_closed() {
                if !health.check(&tx, &mut reported_drops) {
                    break;
                }
                std::thread::sleep(RELEASE_POLL);
            }
            health.report_drops(&mut reported_drops);

            drop(stream);
            info!("Microphone released");
        }
        Err(e) => {
            if ready.send(Err(e)).is_err() {
                info!("Microphone request abandoned");
            }
        }
    }
}

#[async_trait]
impl MediaDevices for MicrophoneDevice {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, RecordingError> {
        let (tx, rx) = mpsc::channel(256);
        let track = MediaTrack::new("microphone");
        let (ready_tx, ready_rx) = oneshot::channel();

        let constraints = *constraints;
        let thread_track = track.clone();
        std::thread::Builder::new()
            .name("voicememo-microphone".to_string())
            .spawn(move || run_stream(constraints, tx, thread_track, ready_tx))
            .map_err(|e| acquisition_error("Failed to spawn capture thread", e))?;

        let (sample_rate, channels) = ready_rx
            .await
            .map_err(|_| RecordingError::Acquisition("Capture thread exited".to_string()))??;

        Ok(MediaStream::new(rx, vec![track], sample_rate, channels))
    }

    fn name(&self) -> &str {
        "microphone"
    }
}
