//! Wire protocol for the captions gateway.
//!
//! Every WebSocket text frame carries one JSON envelope:
//!
//! ```json
//! { "type": "audio" | "video" | "subtitle" | "error",
//!   "data": { ... },
//!   "timestamp": 1718000000000 }
//! ```
//!
//! Clients send `audio` and `video`; the server answers with `subtitle` and
//! `error`. Decoding is strict about the envelope and the payload shape so a
//! malformed message never reaches a recognizer.

pub mod codec;
pub mod envelope;

pub use {
    codec::{CodecError, decode, encode},
    envelope::{
        AudioPayload, Envelope, ErrorPayload, Kind, Payload, SubtitlePayload, VideoPayload,
        now_millis,
    },
};

/// Sample rate assumed when an audio payload omits `sampleRate`.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "translation-backend";

/// Stable machine-readable codes carried in `error` envelopes.
pub mod error_codes {
    pub const MALFORMED_ENVELOPE: &str = "malformed_envelope";
    pub const UNKNOWN_KIND: &str = "unknown_kind";
    pub const INVALID_PAYLOAD: &str = "invalid_payload";
    /// A client sent a kind only the server may emit.
    pub const UNSUPPORTED_KIND: &str = "unsupported_kind";
    /// A binary WebSocket frame; only text frames carry envelopes.
    pub const UNSUPPORTED_FRAME: &str = "unsupported_frame";
    pub const INTERNAL: &str = "internal";
}
