use serde::{Deserialize, Serialize};

/// Lifecycle of one recording attempt
///
/// `Idle → Acquiring → Recording → {StoppingFinalize, StoppingCancel} → Resolved`.
/// `Failed` is reached from `Acquiring` when the device cannot be opened,
/// from `Recording` on a stream error, and from `StoppingFinalize` when the
/// payload cannot be assembled. Nothing leaves `Resolved` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    StoppingFinalize,
    StoppingCancel,
    Resolved,
    Failed,
}

impl SessionState {
    /// Audio is flowing into the backend
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// The session still holds, or is about to hold, the device
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Acquiring | Self::Recording)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }
}
