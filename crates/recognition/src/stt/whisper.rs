//! OpenAI-compatible Whisper STT provider.
//!
//! Works against any server exposing `POST {base_url}/audio/transcriptions`
//! with the OpenAI multipart contract (OpenAI, Groq, local whisper servers).

use {
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    reqwest::{
        Client,
        multipart::{Form, Part},
    },
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

use {
    super::{SpeechRecognizer, Transcript},
    crate::audio::PcmClip,
};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model.
const DEFAULT_MODEL: &str = "whisper-1";

/// Whisper transcription provider.
#[derive(Clone)]
pub struct WhisperStt {
    client: Client,
    api_key: Option<Secret<String>>,
    base_url: String,
    model: String,
    language: Option<String>,
}

impl std::fmt::Debug for WhisperStt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperStt")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .finish()
    }
}

impl Default for WhisperStt {
    fn default() -> Self {
        Self::new(None)
    }
}

impl WhisperStt {
    #[must_use]
    pub fn new(api_key: Option<Secret<String>>) -> Self {
        Self::with_options(api_key, None, None, None)
    }

    #[must_use]
    pub fn with_options(
        api_key: Option<Secret<String>>,
        base_url: Option<String>,
        model: Option<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            language,
        }
    }

    fn get_api_key(&self) -> Result<&Secret<String>> {
        self.api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Whisper API key not configured"))
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperStt {
    fn id(&self) -> &'static str {
        "whisper"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(&self, clip: &PcmClip) -> Result<Option<Transcript>> {
        let api_key = self.get_api_key()?;

        let file_part = Part::bytes(clip.to_wav().to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .context("invalid mime type")?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .context("failed to reach Whisper API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Whisper API error {status}: {body}"));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .context("failed to parse Whisper response")?;

        debug!(
            chars = parsed.text.len(),
            duration_ms = clip.duration().as_millis() as u64,
            "whisper transcription"
        );

        if parsed.text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Transcript::new(parsed.text)))
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
}
