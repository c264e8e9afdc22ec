use std::io::Cursor;
use tracing::debug;

use super::backend::{AudioFrame, AudioPayload};
use crate::error::RecordingError;

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Encode interleaved 16-bit PCM as a WAV file in memory
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

fn finalize_error(e: hound::Error) -> RecordingError {
    RecordingError::Finalize(e.to_string())
}

/// Time-sliced recorder
///
/// Collects samples into bursts of `timeslice_ms` and flushes every full
/// burst as an encoded fragment, so a stop never has more than one burst
/// of pending audio to deal with.
#[derive(Debug)]
pub struct ChunkedRecorder {
    sample_rate: u32,
    channels: u16,
    burst_len: usize,
    burst: Vec<i16>,
    chunks: Vec<Vec<u8>>,
}

impl ChunkedRecorder {
    pub fn new(sample_rate: u32, channels: u16, timeslice_ms: u64) -> Self {
        let burst_len = (u64::from(sample_rate) * u64::from(channels) * timeslice_ms / 1000).max(1) as usize;

        Self {
            sample_rate,
            channels,
            burst_len,
            burst: Vec::with_capacity(burst_len),
            chunks: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: &AudioFrame) {
        self.burst.extend_from_slice(&frame.samples);

        while self.burst.len() >= self.burst_len {
            let rest = self.burst.split_off(self.burst_len);
            let full = std::mem::replace(&mut self.burst, rest);
            self.flush(&full);
        }
    }

    fn flush(&mut self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }
        let fragment: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.chunks.push(fragment);
    }

    /// Number of flushed fragments
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn discard(&mut self) {
        self.burst.clear();
        self.chunks.clear();
    }

    /// Flush the partial burst and assemble every fragment into one payload
    pub fn finish(mut self) -> Result<AudioPayload, RecordingError> {
        let tail = std::mem::take(&mut self.burst);
        self.flush(&tail);

        debug!("Assembling {} fragments", self.chunks.len());

        let samples: Vec<i16> = self
            .chunks
            .iter()
            .flat_map(|chunk| chunk.chunks_exact(2))
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let bytes = encode_wav(&samples, self.sample_rate, self.channels).map_err(finalize_error)?;

        Ok(AudioPayload::new(bytes, WAV_MIME_TYPE))
    }
}

/// Whole-recording buffer, encoded once on stop
#[derive(Debug)]
pub struct BufferedRecorder {
    sample_rate: u32,
    channels: u16,
    samples: Vec<i16>,
}

impl BufferedRecorder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: &AudioFrame) {
        self.samples.extend_from_slice(&frame.samples);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn discard(&mut self) {
        self.samples.clear();
    }

    pub fn finish(self) -> Result<AudioPayload, RecordingError> {
        let bytes = encode_wav(&self.samples, self.sample_rate, self.channels).map_err(finalize_error)?;

        Ok(AudioPayload::new(bytes, WAV_MIME_TYPE))
    }
}
