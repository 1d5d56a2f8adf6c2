//! Config schema types (server, session, recognition).

use std::time::Duration;

use {
    secrecy::Secret,
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptionsConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub recognition: RecognitionConfig,
}

impl CaptionsConfig {
    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let r = &self.recognition;
        let g = &r.gesture;

        if self.session.inbound_queue == 0 {
            anyhow::bail!("session.inbound_queue must be at least 1");
        }
        if r.audio_timeout_ms == 0 || r.video_timeout_ms == 0 {
            anyhow::bail!("recognition timeouts must be greater than zero");
        }
        if r.max_concurrent == 0 {
            anyhow::bail!("recognition.max_concurrent must be at least 1");
        }
        for (name, value) in [
            ("audio_confidence", r.audio_confidence),
            ("video_confidence", r.video_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("recognition.{name} must be within [0, 1], got {value}");
            }
        }
        if g.min_frames < 2 {
            anyhow::bail!("recognition.gesture.min_frames must be at least 2");
        }
        if g.min_frames > g.window_capacity {
            anyhow::bail!(
                "recognition.gesture.min_frames ({}) exceeds window_capacity ({})",
                g.min_frames,
                g.window_capacity
            );
        }
        if r.speech.energy_threshold.is_nan() || r.speech.energy_threshold < 0.0 {
            anyhow::bail!("recognition.speech.energy_threshold must not be negative");
        }
        if !(0.0..=1.0).contains(&g.min_skin_fraction) {
            anyhow::bail!("recognition.gesture.min_skin_fraction must be within [0, 1]");
        }
        Ok(())
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inbound frames buffered per connection while one is being processed.
    pub inbound_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { inbound_queue: 32 }
    }
}

// ── Recognition ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub audio_timeout_ms: u64,
    pub video_timeout_ms: u64,
    /// Recognition calls allowed to run at once across all sessions.
    pub max_concurrent: usize,
    /// Confidence reported when the speech recognizer gives none.
    pub audio_confidence: f32,
    /// Confidence reported when the gesture classifier gives none.
    pub video_confidence: f32,
    pub speech: SpeechConfig,
    pub gesture: GestureConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            audio_timeout_ms: 5_000,
            video_timeout_ms: 5_000,
            max_concurrent: 8,
            audio_confidence: 0.85,
            video_confidence: 0.75,
            speech: SpeechConfig::default(),
            gesture: GestureConfig::default(),
        }
    }
}

impl RecognitionConfig {
    pub fn audio_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_timeout_ms)
    }

    pub fn video_timeout(&self) -> Duration {
        Duration::from_millis(self.video_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    /// OpenAI-compatible `/audio/transcriptions` endpoint.
    Whisper,
    /// Speech recognition disabled.
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub provider: SpeechProvider,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<Secret<String>>,
    pub base_url: String,
    pub model: String,
    pub language: Option<String>,
    /// Optional noise gate: clips whose RMS level (16-bit PCM scale) falls
    /// below this are dropped before transcription. `0` disables it; only
    /// all-zero clips are dropped then.
    pub energy_threshold: f64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::Whisper,
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "whisper-1".into(),
            language: None,
            energy_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Landmark frames kept per session.
    pub window_capacity: usize,
    /// Frames required before classification is attempted.
    pub min_frames: usize,
    /// Movement between the oldest and newest frame that triggers
    /// classification, in normalized image units.
    pub movement_threshold: f32,
    /// Share of skin-toned pixels required to report a hand.
    pub min_skin_fraction: f32,
    /// Gesture model endpoint. Without one, video yields no subtitles.
    pub classifier_url: Option<String>,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            window_capacity: 30,
            min_frames: 10,
            movement_threshold: 0.1,
            min_skin_fraction: 0.02,
            classifier_url: None,
        }
    }
}
