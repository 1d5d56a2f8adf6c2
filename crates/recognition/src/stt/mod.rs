//! Speech-to-text collaborators.

mod whisper;

use {anyhow::Result, async_trait::async_trait};

use crate::audio::PcmClip;

pub use whisper::WhisperStt;

/// Text recognized from one audio clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: Option<f32>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// A speech recognizer. `Ok(None)` means nothing intelligible was heard.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Provider identifier (e.g. "whisper").
    fn id(&self) -> &'static str;

    /// Whether the provider has what it needs to make calls.
    fn is_configured(&self) -> bool;

    async fn transcribe(&self, clip: &PcmClip) -> Result<Option<Transcript>>;
}

/// Recognizer used when speech recognition is disabled or unconfigured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSpeechRecognizer;

#[async_trait]
impl SpeechRecognizer for NoopSpeechRecognizer {
    fn id(&self) -> &'static str {
        "none"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn transcribe(&self, _clip: &PcmClip) -> Result<Option<Transcript>> {
        Ok(None)
    }
}
