use {
    serde::Deserialize,
    serde_json::{Map, Value},
    thiserror::Error,
};

use crate::{
    DEFAULT_SAMPLE_RATE,
    envelope::{
        AudioPayload, Envelope, ErrorPayload, Kind, Payload, SubtitlePayload, VideoPayload,
        now_millis,
    },
    error_codes,
};

/// Why an inbound frame could not be turned into an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    MalformedEnvelope(String),
    #[error("unknown message type '{0}'")]
    UnknownKind(String),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: Kind, reason: String },
}

impl CodecError {
    /// Code reported to the client in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::MalformedEnvelope(_) => error_codes::MALFORMED_ENVELOPE,
            CodecError::UnknownKind(_) => error_codes::UNKNOWN_KIND,
            CodecError::InvalidPayload { .. } => error_codes::INVALID_PAYLOAD,
        }
    }

    /// The error envelope sent back for this failure.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::error(self.to_string(), Some(self.code()))
    }

    fn malformed(reason: &str) -> Self {
        CodecError::MalformedEnvelope(reason.to_string())
    }

    fn invalid(kind: Kind, reason: impl Into<String>) -> Self {
        CodecError::InvalidPayload {
            kind,
            reason: reason.into(),
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawAudio {
    audio: Vec<i64>,
    #[serde(default, rename = "sampleRate")]
    sample_rate: Option<i64>,
}

#[derive(Deserialize)]
struct RawVideo {
    frame: String,
}

/// Parse one text frame into a validated envelope.
pub fn decode(raw: &str) -> Result<Envelope, CodecError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
    let Value::Object(mut obj) = value else {
        return Err(CodecError::malformed("expected a JSON object"));
    };

    let kind = match obj.get("type") {
        Some(Value::String(s)) => {
            Kind::parse(s).ok_or_else(|| CodecError::UnknownKind(s.clone()))?
        },
        Some(_) => return Err(CodecError::malformed("'type' must be a string")),
        None => return Err(CodecError::malformed("missing 'type'")),
    };

    let timestamp = match obj.get("timestamp") {
        Some(v) => v
            .as_i64()
            .ok_or_else(|| CodecError::malformed("'timestamp' must be an integer"))?,
        None => return Err(CodecError::malformed("missing 'timestamp'")),
    };

    let data = match obj.remove("data") {
        Some(Value::Object(data)) => data,
        Some(_) => return Err(CodecError::invalid(kind, "'data' must be an object")),
        None => return Err(CodecError::invalid(kind, "missing 'data'")),
    };

    let payload = match kind {
        Kind::Audio => Payload::Audio(decode_audio(data)?),
        Kind::Video => {
            let raw: RawVideo = from_data(kind, data)?;
            Payload::Video(VideoPayload { frame: raw.frame })
        },
        Kind::Subtitle => Payload::Subtitle(from_data::<SubtitlePayload>(kind, data)?),
        Kind::Error => Payload::Error(from_data::<ErrorPayload>(kind, data)?),
    };

    Ok(Envelope::new(payload, timestamp))
}

fn from_data<T: for<'de> Deserialize<'de>>(
    kind: Kind,
    data: Map<String, Value>,
) -> Result<T, CodecError> {
    serde_json::from_value(Value::Object(data)).map_err(|e| CodecError::invalid(kind, e.to_string()))
}

fn decode_audio(data: Map<String, Value>) -> Result<AudioPayload, CodecError> {
    let raw: RawAudio = from_data(Kind::Audio, data)?;

    let samples = raw
        .audio
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            u8::try_from(v)
                .or_else(|_| i8::try_from(v).map(|b| b as u8))
                .map_err(|_| {
                    CodecError::invalid(Kind::Audio, format!("sample {i} out of byte range: {v}"))
                })
        })
        .collect::<Result<Vec<u8>, _>>()?;

    let sample_rate = match raw.sample_rate {
        None => DEFAULT_SAMPLE_RATE,
        Some(rate) => u32::try_from(rate)
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| {
                CodecError::invalid(Kind::Audio, format!("sampleRate must be positive, got {rate}"))
            })?,
    };

    Ok(AudioPayload {
        samples,
        sample_rate,
    })
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Serialize an envelope into a text frame.
pub fn encode(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|e| {
        format!(
            r#"{{"type":"error","data":{{"error":"failed to encode message: {}","code":"{}"}},"timestamp":{}}}"#,
            e.to_string().replace(['"', '\\'], "'"),
            error_codes::INTERNAL,
            now_millis()
        )
    })
}
