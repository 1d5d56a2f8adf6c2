use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    tokio::{
        sync::{OwnedSemaphorePermit, Semaphore},
        time::Instant,
    },
    tracing::{debug, trace, warn},
};

use {
    captions_config::{RecognitionConfig, SpeechProvider},
    captions_protocol::{AudioPayload, VideoPayload},
};

use crate::{
    audio::PcmClip,
    stt::{NoopSpeechRecognizer, SpeechRecognizer, WhisperStt},
    video::{
        self, GestureClassifier, GestureWindows, HttpGestureClassifier, LandmarkDetector,
        LandmarkFrame, NoopGestureClassifier, SkinRegionDetector,
    },
};

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Audio,
    Video,
}

/// A media fragment routed to the recognizer for its modality.
#[derive(Debug, Clone)]
pub enum RecognitionInput {
    Audio(AudioPayload),
    Video(VideoPayload),
}

impl RecognitionInput {
    pub fn modality(&self) -> Modality {
        match self {
            RecognitionInput::Audio(_) => Modality::Audio,
            RecognitionInput::Video(_) => Modality::Video,
        }
    }
}

/// Text recognized from one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Tunables of the gateway, usually derived from [`RecognitionConfig`].
#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    pub audio_timeout: Duration,
    pub video_timeout: Duration,
    pub max_concurrent: usize,
    pub audio_confidence: f32,
    pub video_confidence: f32,
    pub energy_threshold: f64,
    pub window_capacity: usize,
    pub min_frames: usize,
    pub movement_threshold: f32,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self::from(&RecognitionConfig::default())
    }
}

impl From<&RecognitionConfig> for RecognitionSettings {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            audio_timeout: config.audio_timeout(),
            video_timeout: config.video_timeout(),
            max_concurrent: config.max_concurrent,
            audio_confidence: config.audio_confidence,
            video_confidence: config.video_confidence,
            energy_threshold: config.speech.energy_threshold,
            window_capacity: config.gesture.window_capacity,
            min_frames: config.gesture.min_frames,
            movement_threshold: config.gesture.movement_threshold,
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────────────────

/// Bounded, thread-safe access to the recognizers.
///
/// Every call is limited by a per-modality timeout and a shared concurrency
/// limit. Timeouts and recognizer failures are logged and reported as "no
/// subtitle", never as errors.
pub struct RecognitionGateway {
    speech: Arc<dyn SpeechRecognizer>,
    detector: Arc<dyn LandmarkDetector>,
    classifier: Arc<dyn GestureClassifier>,
    windows: GestureWindows,
    permits: Arc<Semaphore>,
    settings: RecognitionSettings,
}

impl std::fmt::Debug for RecognitionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionGateway")
            .field("speech", &self.speech.id())
            .field("classifier", &self.classifier.id())
            .field("settings", &self.settings)
            .finish()
    }
}

impl RecognitionGateway {
    pub fn new(
        speech: Arc<dyn SpeechRecognizer>,
        detector: Arc<dyn LandmarkDetector>,
        classifier: Arc<dyn GestureClassifier>,
        settings: RecognitionSettings,
    ) -> Self {
        Self {
            speech,
            detector,
            classifier,
            windows: GestureWindows::new(settings.window_capacity, settings.min_frames),
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            settings,
        }
    }

    /// Wire the configured providers.
    pub fn from_config(config: &RecognitionConfig) -> Self {
        let speech_cfg = &config.speech;
        let speech: Arc<dyn SpeechRecognizer> = match speech_cfg.provider {
            SpeechProvider::Whisper => {
                let whisper = WhisperStt::with_options(
                    speech_cfg.api_key.clone(),
                    Some(speech_cfg.base_url.clone()),
                    Some(speech_cfg.model.clone()),
                    speech_cfg.language.clone(),
                );
                if whisper.is_configured() {
                    Arc::new(whisper)
                } else {
                    warn!("no speech API key configured, audio will not be transcribed");
                    Arc::new(NoopSpeechRecognizer)
                }
            },
            SpeechProvider::None => Arc::new(NoopSpeechRecognizer),
        };

        let classifier: Arc<dyn GestureClassifier> = match &config.gesture.classifier_url {
            Some(url) => Arc::new(HttpGestureClassifier::new(url.clone())),
            None => {
                debug!("no gesture classifier configured, video will not be captioned");
                Arc::new(NoopGestureClassifier)
            },
        };

        Self::new(
            speech,
            Arc::new(SkinRegionDetector::new(config.gesture.min_skin_fraction)),
            classifier,
            RecognitionSettings::from(config),
        )
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    pub fn speech_provider(&self) -> &'static str {
        self.speech.id()
    }

    pub fn gesture_classifier(&self) -> &'static str {
        self.classifier.id()
    }

    pub fn windows(&self) -> &GestureWindows {
        &self.windows
    }

    /// Recognize one fragment arriving on connection `conn_id`.
    ///
    /// Per-connection state (the gesture window) is keyed by `conn_id`, so
    /// two connections reusing one user id never share frames.
    ///
    /// Returns `None` when nothing was recognized, the call timed out, or a
    /// recognizer failed.
    pub async fn recognize(&self, conn_id: &str, input: RecognitionInput) -> Option<Recognition> {
        let modality = input.modality();
        let timeout = match modality {
            Modality::Audio => self.settings.audio_timeout,
            Modality::Video => self.settings.video_timeout,
        };
        let started = Instant::now();

        let work = async {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .context("recognition gateway closed")?;
            match input {
                RecognitionInput::Audio(payload) => {
                    let _permit = permit;
                    self.recognize_audio(conn_id, &payload).await
                },
                RecognitionInput::Video(payload) => {
                    self.recognize_video(conn_id, payload, permit).await
                },
            }
        };

        let recognized = match tokio::time::timeout(timeout, work).await {
            Err(_) => {
                warn!(
                    conn_id,
                    ?modality,
                    timeout_ms = timeout.as_millis() as u64,
                    "recognition timed out"
                );
                return None;
            },
            Ok(Err(e)) => {
                warn!(conn_id, ?modality, error = %e, "recognition failed");
                return None;
            },
            Ok(Ok(recognized)) => recognized?,
        };

        let recognized = self.normalize(modality, recognized)?;
        debug!(
            conn_id,
            ?modality,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = recognized.text.len(),
            "recognized"
        );
        Some(recognized)
    }

    /// Drop everything kept for a connection that has ended.
    pub fn end_session(&self, conn_id: &str) {
        self.windows.remove(conn_id);
    }

    async fn recognize_audio(
        &self,
        conn_id: &str,
        payload: &AudioPayload,
    ) -> anyhow::Result<Option<Recognition>> {
        let clip = PcmClip::from_payload(payload)?;
        if clip.is_empty() {
            return Ok(None);
        }

        let level = clip.rms();
        if level == 0.0 {
            trace!(conn_id, "digital silence");
            return Ok(None);
        }
        if level < self.settings.energy_threshold {
            trace!(conn_id, rms = level, "audio below energy threshold");
            return Ok(None);
        }

        let transcript = self.speech.transcribe(&clip).await?;
        Ok(transcript.map(|t| Recognition {
            text: t.text,
            confidence: t.confidence,
        }))
    }

    async fn recognize_video(
        &self,
        conn_id: &str,
        payload: VideoPayload,
        permit: OwnedSemaphorePermit,
    ) -> anyhow::Result<Option<Recognition>> {
        let detector = Arc::clone(&self.detector);
        let frame: LandmarkFrame = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let image = video::decode_frame(&payload.frame)?;
            detector.detect(&image)
        })
        .await
        .context("landmark detection task failed")??;

        if frame.is_empty() {
            return Ok(None);
        }

        let Some(window) = self.windows.push(conn_id, frame) else {
            return Ok(None);
        };
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return Ok(None);
        };
        let moved = video::movement(first, last);
        if moved <= self.settings.movement_threshold {
            trace!(conn_id, movement = moved, "no significant hand movement");
            return Ok(None);
        }

        let sign = self.classifier.classify(&window).await?;
        if sign.is_some() {
            self.windows.clear(conn_id);
        }
        Ok(sign)
    }

    fn normalize(&self, modality: Modality, recognized: Recognition) -> Option<Recognition> {
        let text = recognized.text.trim();
        if text.is_empty() {
            return None;
        }
        let fallback = match modality {
            Modality::Audio => self.settings.audio_confidence,
            Modality::Video => self.settings.video_confidence,
        };
        let confidence = recognized
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(fallback)
            .clamp(0.0, 1.0);
        Some(Recognition {
            text: text.to_string(),
            confidence: Some(confidence),
        })
    }
}
