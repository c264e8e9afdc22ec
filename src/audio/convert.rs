// Sample format conversion for capture streams
//
// Devices deliver whatever the hardware or file provides. The capture task
// runs every frame through a `FrameConformer` so the recorder only ever
// sees the rate and channel count it was asked for.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use tracing::debug;

use super::backend::AudioFrame;
use super::device::MediaConstraints;
use crate::error::RecordingError;

/// Frames per channel handed to the sinc resampler per call
const RESAMPLER_CHUNK: usize = 1024;
/// Zero-padded chunks allowed to drain the resampler on flush
const MAX_FLUSH_ROUNDS: usize = 8;

fn resample_error(e: impl std::fmt::Display) -> RecordingError {
    RecordingError::Finalize(format!("Resampling failed: {}", e))
}

/// Converts a stream's native format to the requested constraints
pub struct FrameConformer {
    source_channels: u16,
    target: MediaConstraints,
    resampler: Option<StreamResampler>,
}

impl FrameConformer {
    pub fn new(sample_rate: u32, channels: u16, target: MediaConstraints) -> Result<Self, RecordingError> {
        if sample_rate == 0 || channels == 0 || target.sample_rate == 0 || target.channels == 0 {
            return Err(RecordingError::Acquisition(format!(
                "Unusable stream format: {}Hz x{} to {}Hz x{}",
                sample_rate, channels, target.sample_rate, target.channels
            )));
        }

        let resampler = if sample_rate == target.sample_rate {
            None
        } else {
            debug!("Resampling {}Hz -> {}Hz", sample_rate, target.sample_rate);
            Some(StreamResampler::new(sample_rate, target.sample_rate, target.channels)?)
        };

        Ok(Self {
            source_channels: channels,
            target,
            resampler,
        })
    }

    /// Whether frames need any work at all
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none() && self.source_channels == self.target.channels
    }

    /// Conform one frame. A resampler holds audio back until it has a full
    /// chunk, so this may return `None`.
    pub fn conform(&mut self, frame: AudioFrame) -> Result<Option<AudioFrame>, RecordingError> {
        let timestamp_ms = frame.timestamp_ms;
        let samples = remix(frame.samples, self.source_channels, self.target.channels);

        let samples = match self.resampler.as_mut() {
            Some(resampler) => resampler.push(&samples)?,
            None => samples,
        };

        Ok(self.frame(samples, timestamp_ms))
    }

    /// Drain whatever the resampler still holds
    pub fn flush(&mut self) -> Result<Option<AudioFrame>, RecordingError> {
        let samples = match self.resampler.as_mut() {
            Some(resampler) => resampler.flush()?,
            None => Vec::new(),
        };

        Ok(self.frame(samples, 0))
    }

    fn frame(&self, samples: Vec<i16>, timestamp_ms: u64) -> Option<AudioFrame> {
        if samples.is_empty() {
            return None;
        }

        Some(AudioFrame {
            samples,
            sample_rate: self.target.sample_rate,
            channels: self.target.channels,
            timestamp_ms,
        })
    }
}

/// Rate converter for a continuous stream
///
/// The sinc filter delays its output; the first `delay` output frames are
/// dropped and `flush` pads with silence until the output length matches
/// the input length at the new rate.
struct StreamResampler {
    resampler: SincFixedIn<f32>,
    channels: usize,
    ratio: f64,
    pending: Vec<Vec<f32>>,
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    fn new(from: u32, to: u32, channels: u16) -> Result<Self, RecordingError> {
        let ratio = f64::from(to) / f64::from(from);
        let channels = usize::from(channels);

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLER_CHUNK, channels)
            .map_err(|e| RecordingError::Acquisition(format!("Failed to create resampler: {}", e)))?;
        let delay = resampler.output_delay();

        Ok(Self {
            resampler,
            channels,
            ratio,
            pending: vec![Vec::with_capacity(RESAMPLER_CHUNK * 2); channels],
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    fn push(&mut self, samples: &[i16]) -> Result<Vec<i16>, RecordingError> {
        for frame in samples.chunks_exact(self.channels) {
            for (pending, &sample) in self.pending.iter_mut().zip(frame) {
                pending.push(i16_to_f32(sample));
            }
        }
        self.frames_in += (samples.len() / self.channels) as u64;

        let mut out = Vec::new();
        while self.pending[0].len() >= RESAMPLER_CHUNK {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|pending| pending.drain(..RESAMPLER_CHUNK).collect())
                .collect();
            self.process(&chunk, &mut out)?;
        }

        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<i16>, RecordingError> {
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let mut out = Vec::new();

        for _ in 0..MAX_FLUSH_ROUNDS {
            if self.frames_out >= expected {
                break;
            }

            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|pending| {
                    let mut chunk: Vec<f32> = pending.drain(..).collect();
                    chunk.resize(RESAMPLER_CHUNK, 0.0);
                    chunk
                })
                .collect();
            self.process(&chunk, &mut out)?;
        }

        let excess = (self.frames_out.saturating_sub(expected) as usize).min(out.len() / self.channels);
        out.truncate(out.len() - excess * self.channels);
        self.frames_out -= excess as u64;

        Ok(out)
    }

    fn process(&mut self, chunk: &[Vec<f32>], out: &mut Vec<i16>) -> Result<(), RecordingError> {
        let planar = self.resampler.process(chunk, None).map_err(resample_error)?;
        let frames = planar.first().map_or(0, Vec::len);

        let skip = self.delay.min(frames);
        self.delay -= skip;

        for index in skip..frames {
            for channel in &planar {
                out.push(f32_to_i16(channel[index]));
            }
        }
        self.frames_out += (frames - skip) as u64;

        Ok(())
    }
}

/// Change the channel count: average down to mono, then copy out to the
/// target layout
pub fn remix(samples: Vec<i16>, from: u16, to: u16) -> Vec<i16> {
    if from == to || from == 0 || to == 0 {
        return samples;
    }

    let mono = if from == 1 { samples } else { downmix_to_mono(&samples, from) };
    if to == 1 {
        return mono;
    }

    mono.iter()
        .flat_map(|&sample| std::iter::repeat(sample).take(usize::from(to)))
        .collect()
}

/// Average interleaved channels into one
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    let channels = usize::from(channels.max(1));

    samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

/// Scale a float sample in [-1, 1] to 16-bit PCM
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
