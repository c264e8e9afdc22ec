//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - Capture backend selection and stream acquisition
//! - Stop/cancel requests and the single completion outcome
//! - Bounded waiting for the live analyser
//! - Volume tracking for the memo waveform

mod session;
mod state;
mod volume;

pub use session::{Completion, RecordingSession};
pub use state::SessionState;
pub use volume::{VolumeLevel, VolumeTrace, VolumeTracker};
