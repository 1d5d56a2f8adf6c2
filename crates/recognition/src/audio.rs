//! PCM conversion and WAV framing for browser audio captures.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use captions_protocol::AudioPayload;

use crate::error::MediaError;

const WAV_HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Mono 16-bit PCM audio at a known sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmClip {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl PcmClip {
    /// Reinterpret the payload bytes as little-endian `f32` samples in
    /// `[-1, 1]` and rescale them to 16-bit PCM.
    pub fn from_payload(payload: &AudioPayload) -> Result<Self, MediaError> {
        let bytes = &payload.samples;
        if bytes.len() % 4 != 0 {
            return Err(MediaError::PartialSample(bytes.len()));
        }
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self::from_f32(&floats, payload.sample_rate))
    }

    /// Non-finite samples become silence; the rest are clamped to `[-1, 1]`.
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let samples = samples
            .iter()
            .map(|&s| {
                if s.is_finite() {
                    (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
                } else {
                    0
                }
            })
            .collect();
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(
            self.samples.len() as u64 * 1_000_000_000 / u64::from(self.sample_rate),
        )
    }

    /// Root-mean-square level on the 16-bit scale.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let s = f64::from(s);
                s * s
            })
            .sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    /// Frame the samples as a RIFF/WAVE file.
    pub fn to_wav(&self) -> Bytes {
        let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
        let byte_rate = self.sample_rate * u32::from(block_align);
        let data_len = (self.samples.len() * 2) as u32;

        let mut buf = BytesMut::with_capacity(WAV_HEADER_LEN + data_len as usize);
        buf.put_slice(b"RIFF");
        buf.put_u32_le(36 + data_len);
        buf.put_slice(b"WAVE");

        buf.put_slice(b"fmt ");
        buf.put_u32_le(16);
        buf.put_u16_le(1); // PCM
        buf.put_u16_le(CHANNELS);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(byte_rate);
        buf.put_u16_le(block_align);
        buf.put_u16_le(BITS_PER_SAMPLE);

        buf.put_slice(b"data");
        buf.put_u32_le(data_len);
        for s in &self.samples {
            buf.put_i16_le(*s);
        }
        buf.freeze()
    }
}
