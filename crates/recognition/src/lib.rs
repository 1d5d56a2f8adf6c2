//! Recognition gateway: turns audio and video fragments into subtitle text.
//!
//! The recognizers themselves are collaborators behind traits
//! ([`SpeechRecognizer`], [`LandmarkDetector`], [`GestureClassifier`]). The
//! [`RecognitionGateway`] bounds every call with a timeout and a shared
//! concurrency limit, and keeps gesture windows per session.

pub mod audio;
pub mod error;
pub mod gateway;
pub mod stt;
pub mod video;

pub use {
    audio::PcmClip,
    error::MediaError,
    gateway::{Modality, Recognition, RecognitionGateway, RecognitionInput, RecognitionSettings},
    stt::{NoopSpeechRecognizer, SpeechRecognizer, Transcript, WhisperStt},
    video::{
        GestureClassifier, GestureWindows, HttpGestureClassifier, LandmarkDetector,
        LandmarkFrame, NoopGestureClassifier, SkinRegionDetector,
    },
};
