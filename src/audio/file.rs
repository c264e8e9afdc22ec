use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use super::backend::AudioFrame;
use super::device::{MediaConstraints, MediaDevices, MediaStream, PlatformCapabilities, StreamEvent};
use crate::error::RecordingError;

/// Decoded audio file (interleaved 16-bit PCM)
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Decode any format symphonia understands (WAV, MP3, M4A, FLAC, OGG)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Unsupported audio format")?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No audio track found")?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Unsupported audio codec")?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e).context("Failed to read audio packet"),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;

                    let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(e).context("Failed to decode audio packet"),
            }
        }

        if sample_rate == 0 || channels == 0 {
            anyhow::bail!("Audio file has no sample rate or channel layout: {}", path.display());
        }

        let duration_seconds = samples.len() as f64 / (sample_rate as f64 * channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        })
    }
}

/// Capture device that plays an audio file out in real time
///
/// Useful for recording without a microphone and for reproducible runs.
/// The stream ends when the file is exhausted.
pub struct FileDevice {
    path: PathBuf,
    capabilities: PlatformCapabilities,
    burst: Duration,
    name: String,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());

        Self {
            path,
            capabilities: PlatformCapabilities::full(),
            burst: Duration::from_millis(20),
            name,
        }
    }

    /// Report different recorder capabilities (forces backend selection)
    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Length of audio delivered per event
    pub fn with_burst(mut self, burst: Duration) -> Self {
        self.burst = burst;
        self
    }
}

#[async_trait]
impl MediaDevices for FileDevice {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, RecordingError> {
        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| RecordingError::Acquisition(format!("Decoder task failed: {}", e)))?
            .map_err(|e| RecordingError::Acquisition(format!("{:#}", e)))?;

        // Played out in the file's own format; the capture task converts it
        debug!(
            "Requested {}Hz x{}, file is {}Hz x{}",
            constraints.sample_rate, constraints.channels, audio.sample_rate, audio.channels
        );
        let sample_rate = audio.sample_rate;
        let channels = audio.channels;

        let (tx, track, stream) = MediaStream::single_track(self.name.clone(), sample_rate, channels, 64);

        let burst = self.burst;
        let per_burst = ((u128::from(sample_rate) * burst.as_millis()) / 1000).max(1) as usize * usize::from(channels);
        let samples = audio.samples;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(burst);
            let mut timestamp_ms = 0;

            for chunk in samples.chunks(per_burst) {
                ticker.tick().await;
                if track.is_stopped() {
                    debug!("File track stopped");
                    return;
                }

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                if tx.send(StreamEvent::Frame(frame)).await.is_err() {
                    return;
                }
                timestamp_ms += burst.as_millis() as u64;
            }

            debug!("End of file reached");
        });

        Ok(stream)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
