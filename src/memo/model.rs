use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audio::AudioPayload;

pub const DEFAULT_TITLE: &str = "Untitled Memo";

/// A stored voice memo
///
/// The audio bytes are kept out of the serialized metadata; stores persist
/// them separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    pub title: String,
    pub description: Option<String>,
    /// 16 lowercase hex characters, also the memo's key
    pub url: String,
    #[serde(skip)]
    pub audio: Vec<u8>,
    pub audio_mime_type: String,
    /// Normalized waveform, every value in [0, 1]
    pub volume_data: Vec<f32>,
    /// Creation time, epoch milliseconds
    pub time: i64,
    pub transcript: Option<String>,
}

impl Memo {
    /// New untitled memo from a finished recording
    pub fn new(audio: AudioPayload, volume_data: Vec<f32>) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            description: None,
            url: make_url(),
            audio: audio.bytes,
            audio_mime_type: audio.mime_type,
            volume_data,
            time: Utc::now().timestamp_millis(),
            transcript: None,
        }
    }

    /// Blank titles fall back to the default
    pub fn set_title(&mut self, title: &str) {
        let trimmed = title.trim();
        self.title = if trimmed.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title.to_string()
        };
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description.filter(|d| !d.trim().is_empty());
    }

    /// File extension for the stored audio
    pub fn audio_extension(&self) -> &'static str {
        extension_for(&self.audio_mime_type)
    }
}

pub(crate) fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or_default().trim() {
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        _ => "bin",
    }
}

/// Random 16-character hex id
pub fn make_url() -> String {
    // Keep only the random bits of a v4 UUID (version and variant excluded)
    let (high, low) = uuid::Uuid::new_v4().as_u64_pair();
    let random = (high & 0xFFFF_FFFF_FFFF_0000) | (low & 0xFFFF);
    format!("{:016x}", random)
}
