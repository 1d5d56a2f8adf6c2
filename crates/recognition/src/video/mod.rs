//! Video path: frame decoding, hand landmarks, per-session gesture windows.

mod classifier;
mod landmarks;
mod window;

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    image::DynamicImage,
};

use crate::error::MediaError;

pub use {
    classifier::{GestureClassifier, HttpGestureClassifier, NoopGestureClassifier},
    landmarks::{Hand, Landmark, LandmarkDetector, LandmarkFrame, SkinRegionDetector},
    window::{GestureWindows, movement},
};

/// Drop a `data:<mime>;base64,` prefix, if any.
pub fn strip_data_uri(frame: &str) -> &str {
    frame.split_once(',').map_or(frame, |(_, data)| data)
}

/// Decode a base64 (or data-URI) camera frame into an image.
pub fn decode_frame(frame: &str) -> Result<DynamicImage, MediaError> {
    let encoded = strip_data_uri(frame.trim()).trim();
    if encoded.is_empty() {
        return Err(MediaError::EmptyFrame);
    }
    let bytes = STANDARD.decode(encoded)?;
    Ok(image::load_from_memory(&bytes)?)
}
