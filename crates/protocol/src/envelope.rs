use std::fmt;

use serde::{
    Deserialize, Serialize, Serializer,
    ser::SerializeMap,
};

use crate::DEFAULT_SAMPLE_RATE;

// ── Kinds ────────────────────────────────────────────────────────────────────

/// Discriminant of an envelope. Closed set: anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Audio,
    Video,
    Subtitle,
    Error,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Audio, Kind::Video, Kind::Subtitle, Kind::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Audio => "audio",
            Kind::Video => "video",
            Kind::Subtitle => "subtitle",
            Kind::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Raw capture bytes from the browser plus their sample rate.
///
/// The browser ships its `Float32Array` capture buffer byte by byte, so
/// `samples` holds little-endian `f32` values, four bytes each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioPayload {
    #[serde(rename = "audio")]
    pub samples: Vec<u8>,
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
}

impl AudioPayload {
    pub fn new(samples: Vec<u8>) -> Self {
        Self {
            samples,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

/// One camera frame as base64 text, possibly a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoPayload {
    pub frame: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitlePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Kind-specific body of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Audio(AudioPayload),
    Video(VideoPayload),
    Subtitle(SubtitlePayload),
    Error(ErrorPayload),
}

impl Payload {
    pub fn kind(&self) -> Kind {
        match self {
            Payload::Audio(_) => Kind::Audio,
            Payload::Video(_) => Kind::Video,
            Payload::Subtitle(_) => Kind::Subtitle,
            Payload::Error(_) => Kind::Error,
        }
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// The unit of exchange in both directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub payload: Payload,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(payload: Payload, timestamp: i64) -> Self {
        Self { payload, timestamp }
    }

    pub fn kind(&self) -> Kind {
        self.payload.kind()
    }

    pub fn audio(payload: AudioPayload, timestamp: i64) -> Self {
        Self::new(Payload::Audio(payload), timestamp)
    }

    pub fn video(frame: impl Into<String>, timestamp: i64) -> Self {
        Self::new(
            Payload::Video(VideoPayload {
                frame: frame.into(),
            }),
            timestamp,
        )
    }

    /// A subtitle answering the inbound message sent at `timestamp`.
    pub fn subtitle(text: impl Into<String>, confidence: Option<f32>, timestamp: i64) -> Self {
        Self::new(
            Payload::Subtitle(SubtitlePayload {
                text: text.into(),
                confidence,
            }),
            timestamp,
        )
    }

    /// An error stamped with the current server time.
    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::new(
            Payload::Error(ErrorPayload {
                error: message.into(),
                code: code.map(String::from),
            }),
            now_millis(),
        )
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("type", self.kind().as_str())?;
        match &self.payload {
            Payload::Audio(p) => map.serialize_entry("data", p)?,
            Payload::Video(p) => map.serialize_entry("data", p)?,
            Payload::Subtitle(p) => map.serialize_entry("data", p)?,
            Payload::Error(p) => map.serialize_entry("data", p)?,
        }
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.end()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
