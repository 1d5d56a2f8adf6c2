use thiserror::Error;

/// Failure to turn a media payload into something a recognizer accepts.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("audio buffer of {0} bytes is not a whole number of f32 samples")]
    PartialSample(usize),

    #[error("empty video frame")]
    EmptyFrame,

    #[error("invalid base64 frame: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
}
