//! Live frequency analysis of a capture stream.
//!
//! A capture backend creates one [`SourceNode`] once its stream is acquired
//! and feeds every incoming frame into it. Any number of [`Analyser`]s can
//! tap the node; they only hold a weak reference, so the backend stays the
//! sole owner of the audio graph.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Weak};

use super::backend::AudioFrame;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

/// Shared tap on a live stream: keeps the most recent mono samples
#[derive(Debug)]
pub struct SourceNode {
    sample_rate: u32,
    capacity: usize,
    window: Mutex<VecDeque<f32>>,
}

impl SourceNode {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        Self {
            sample_rate,
            capacity,
            window: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Append a frame, downmixed to mono and scaled to [-1, 1]
    pub fn feed(&self, frame: &AudioFrame) {
        let channels = usize::from(frame.channels.max(1));
        let mut window = self.window.lock();

        for chunk in frame.samples.chunks(channels) {
            let sum: f32 = chunk.iter().map(|&s| f32::from(s) / 32768.0).sum();
            window.push_back(sum / chunk.len() as f32);
        }

        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    /// The latest `len` samples, zero-padded at the front when fewer exist
    pub fn snapshot(&self, len: usize) -> Vec<f32> {
        let window = self.window.lock();
        let available = window.len().min(len);
        let mut out = vec![0.0; len - available];
        out.extend(window.iter().skip(window.len() - available));
        out
    }
}

/// Frequency-domain view of a [`SourceNode`]
///
/// Mirrors a Web Audio analyser: Blackman window, FFT, time smoothing,
/// decibel scaling into bytes between -100 dB and -30 dB.
#[derive(Debug)]
pub struct Analyser {
    source: Weak<SourceNode>,
    fft_size: usize,
    smoothing: f32,
    smoothed: Vec<f32>,
}

impl Analyser {
    /// Tap `source`. `fft_size` is rounded to a power of two in 32..=32768.
    pub fn connect(source: &Arc<SourceNode>, fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.next_power_of_two().clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);

        Self {
            source: Arc::downgrade(source),
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Whether the source node is still alive
    pub fn is_connected(&self) -> bool {
        self.source.strong_count() > 0
    }

    /// Fill `out` with byte magnitudes, one per bin. Entries past the bin
    /// count are left untouched. A dropped source reads as silence.
    pub fn get_byte_frequency_data(&mut self, out: &mut [u8]) {
        let samples = match self.source.upgrade() {
            Some(source) => source.snapshot(self.fft_size),
            None => vec![0.0; self.fft_size],
        };

        let n = self.fft_size;
        let mut re: Vec<f32> = samples
            .iter()
            .enumerate()
            .map(|(i, s)| s * blackman(i, n))
            .collect();
        let mut im = vec![0.0; n];
        fft(&mut re, &mut im);

        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);
        for (k, slot) in self.smoothed.iter_mut().enumerate() {
            let magnitude = (re[k] * re[k] + im[k] * im[k]).sqrt() / n as f32;
            *slot = self.smoothing * *slot + (1.0 - self.smoothing) * magnitude;

            if let Some(byte) = out.get_mut(k) {
                let db = 20.0 * slot.log10();
                *byte = (scale * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn blackman(i: usize, n: usize) -> f32 {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    let x = 2.0 * PI * i as f32 / n as f32;
    a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
}

/// In-place iterative radix-2 FFT. `re.len()` must be a power of two.
fn fft(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two());
    debug_assert_eq!(n, im.len());

    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        for start in (0..n).step_by(len) {
            for k in 0..len / 2 {
                let (sin, cos) = (angle * k as f32).sin_cos();
                let a = start + k;
                let b = a + len / 2;
                let tr = re[b] * cos - im[b] * sin;
                let ti = re[b] * sin + im[b] * cos;
                re[b] = re[a] - tr;
                im[b] = im[a] - ti;
                re[a] += tr;
                im[a] += ti;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_frame(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> AudioFrame {
        let samples = (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((2.0 * PI * freq * t).sin() * amplitude * 32767.0) as i16
            })
            .collect();

        AudioFrame {
            samples,
            sample_rate,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_fft_of_impulse_is_flat() {
        let mut re = vec![0.0; 8];
        let mut im = vec![0.0; 8];
        re[0] = 1.0;

        fft(&mut re, &mut im);

        for k in 0..8 {
            assert!((re[k] - 1.0).abs() < 1e-5);
            assert!(im[k].abs() < 1e-5);
        }
    }

    #[test]
    fn test_snapshot_pads_and_trims() {
        let node = SourceNode::new(16000, 4);
        node.feed(&AudioFrame {
            samples: vec![16384, 16384],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        });

        assert_eq!(node.snapshot(4), vec![0.0, 0.0, 0.5, 0.5]);

        node.feed(&AudioFrame {
            samples: vec![0; 10],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 10,
        });
        assert_eq!(node.snapshot(2), vec![0.0, 0.0]);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let node = SourceNode::new(16000, 8);
        node.feed(&AudioFrame {
            samples: vec![16384, 0, 16384, 0],
            sample_rate: 16000,
            channels: 2,
            timestamp_ms: 0,
        });

        assert_eq!(node.snapshot(2), vec![0.25, 0.25]);
    }

    #[test]
    fn test_silence_reads_as_zero() {
        let node = Arc::new(SourceNode::new(16000, 512));
        node.feed(&AudioFrame {
            samples: vec![0; 512],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        });

        let mut analyser = Analyser::connect(&node, 512, 0.0);
        let mut data = vec![9u8; 256];
        analyser.get_byte_frequency_data(&mut data);

        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_at_its_bin() {
        // 512-point FFT at 16kHz: 31.25Hz per bin, 2000Hz lands on bin 64
        let node = Arc::new(SourceNode::new(16000, 512));
        node.feed(&sine_frame(2000.0, 16000, 512, 0.8));

        let mut analyser = Analyser::connect(&node, 512, 0.0);
        let mut data = vec![0u8; analyser.frequency_bin_count()];
        analyser.get_byte_frequency_data(&mut data);

        let peak = data
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap_or_default();
        assert!((63..=65).contains(&peak), "peak at bin {}", peak);
        assert!(data[64] > data[200]);
    }

    #[test]
    fn test_dropped_source_reads_as_silence() {
        let node = Arc::new(SourceNode::new(16000, 512));
        node.feed(&sine_frame(1000.0, 16000, 512, 0.8));
        let mut analyser = Analyser::connect(&node, 512, 0.0);

        drop(node);

        assert!(!analyser.is_connected());
        let mut data = vec![0u8; 256];
        analyser.get_byte_frequency_data(&mut data);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fft_size_is_normalized() {
        let node = Arc::new(SourceNode::new(16000, 16));

        assert_eq!(Analyser::connect(&node, 300, 0.3).fft_size(), 512);
        assert_eq!(Analyser::connect(&node, 4, 0.3).fft_size(), 32);
    }
}
