use {
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    reqwest::Client,
    serde::{Deserialize, Serialize},
};

use {super::landmarks::LandmarkFrame, crate::gateway::Recognition};

/// Maps a window of landmark frames to a sign, if one was made.
#[async_trait]
pub trait GestureClassifier: Send + Sync {
    fn id(&self) -> &'static str;

    /// `window` is ordered oldest first.
    async fn classify(&self, window: &[LandmarkFrame]) -> Result<Option<Recognition>>;
}

/// Classifier used when no gesture model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGestureClassifier;

#[async_trait]
impl GestureClassifier for NoopGestureClassifier {
    fn id(&self) -> &'static str {
        "none"
    }

    async fn classify(&self, _window: &[LandmarkFrame]) -> Result<Option<Recognition>> {
        Ok(None)
    }
}

/// Delegates classification to a model service over HTTP.
///
/// The service receives `{"frames": [[[{x,y,z}, ...], ...], ...]}` and answers
/// `{"text": "hello", "confidence": 0.9}`, with `text` null or absent when
/// no sign was recognized.
#[derive(Debug, Clone)]
pub struct HttpGestureClassifier {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    frames: &'a [LandmarkFrame],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

impl HttpGestureClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl GestureClassifier for HttpGestureClassifier {
    fn id(&self) -> &'static str {
        "http"
    }

    async fn classify(&self, window: &[LandmarkFrame]) -> Result<Option<Recognition>> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { frames: window })
            .send()
            .await
            .context("failed to reach gesture classifier")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("gesture classifier error {status}: {body}"));
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .context("failed to parse gesture classifier response")?;

        Ok(parsed
            .text
            .filter(|t| !t.trim().is_empty())
            .map(|text| Recognition {
                text,
                confidence: parsed.confidence,
            }))
    }
}
