use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::state::SessionState;
use crate::audio::Analyser;
use crate::config::RecorderConfig;

/// One tick's reading, handed to the level callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VolumeLevel {
    /// Mean byte magnitude of the sampled bins (0..=255)
    pub raw: f32,
    /// `raw` divided by the running maximum
    pub normalized: f32,
}

/// Raw volume samples of a whole session plus their running maximum
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeTrace {
    samples: Vec<f32>,
    max: f32,
}

impl VolumeTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: f32) {
        if sample > self.max {
            self.max = sample;
        }
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Level of `sample` relative to the maximum seen so far
    pub fn level(&self, sample: f32) -> f32 {
        if self.max > 0.0 {
            sample / self.max
        } else {
            0.0
        }
    }

    /// Every sample divided by the maximum; the loudest lands on exactly 1.0.
    /// A silent trace stays all zeros.
    pub fn normalized(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| self.level(s)).collect()
    }
}

/// Samples an analyser at a display-like cadence while a session records
#[derive(Debug, Clone)]
pub struct VolumeTracker {
    skip_bins: usize,
    frame_interval: Duration,
}

impl VolumeTracker {
    pub fn new(skip_bins: usize, frame_interval: Duration) -> Self {
        Self {
            skip_bins,
            frame_interval,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(config.skip_bins, config.frame_interval())
    }

    /// Mean magnitude of the bins above `skip_bins`
    pub fn sample(&self, analyser: &mut Analyser, bins: &mut [u8]) -> f32 {
        analyser.get_byte_frequency_data(bins);

        let start = self.skip_bins.min(bins.len());
        let range = bins.len() - start;
        if range == 0 {
            return 0.0;
        }

        let sum: u32 = bins[start..].iter().map(|&b| u32::from(b)).sum();
        sum as f32 / range as f32
    }

    /// Sample on every tick until the session stops recording
    ///
    /// The sample taken on the tick that observes the stop is kept.
    pub async fn run<F>(
        &self,
        mut analyser: Analyser,
        state: watch::Receiver<SessionState>,
        mut on_level: F,
    ) -> VolumeTrace
    where
        F: FnMut(VolumeLevel),
    {
        let mut bins = vec![0u8; analyser.frequency_bin_count()];
        let mut trace = VolumeTrace::new();

        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let raw = self.sample(&mut analyser, &mut bins);
            trace.push(raw);
            on_level(VolumeLevel {
                raw,
                normalized: trace.level(raw),
            });

            if !state.borrow().is_recording() {
                break;
            }
        }

        debug!(
            "Volume tracking stopped: {} samples, max {:.1}",
            trace.len(),
            trace.max()
        );

        on_level(VolumeLevel::default());
        trace
    }
}
