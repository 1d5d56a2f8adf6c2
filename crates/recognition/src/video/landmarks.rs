use {
    image::{DynamicImage, GenericImageView, Rgb},
    serde::Serialize,
};

/// A point in normalized image coordinates (`0..=1` on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Landmarks of one detected hand, in detector-defined order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Hand {
    pub points: Vec<Landmark>,
}

/// All hands detected in one frame. Empty when no hand is visible.
pub type LandmarkFrame = Vec<Hand>;

/// Extracts hand landmarks from a decoded frame.
///
/// Called on the blocking thread pool; implementations may be slow.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<LandmarkFrame>;
}

/// Frames are downscaled to fit this box before scanning.
const SCAN_WIDTH: u32 = 160;
const SCAN_HEIGHT: u32 = 120;

/// Coarse hand locator based on skin-tone segmentation.
///
/// Reports at most one hand with three points: the centroid of skin pixels
/// and the two corners of their bounding box. `z` carries the skin coverage.
#[derive(Debug, Clone)]
pub struct SkinRegionDetector {
    min_fraction: f32,
}

impl Default for SkinRegionDetector {
    fn default() -> Self {
        Self::new(0.02)
    }
}

impl SkinRegionDetector {
    pub fn new(min_fraction: f32) -> Self {
        Self { min_fraction }
    }

    /// RGB skin rule for daylight illumination.
    fn is_skin(Rgb([r, g, b]): Rgb<u8>) -> bool {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        r > 95 && g > 40 && b > 20 && max - min > 15 && r.abs_diff(g) > 15 && r > g && r > b
    }
}

impl LandmarkDetector for SkinRegionDetector {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<LandmarkFrame> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }
        let scaled;
        let image = if w > SCAN_WIDTH || h > SCAN_HEIGHT {
            scaled = image.thumbnail(SCAN_WIDTH, SCAN_HEIGHT);
            &scaled
        } else {
            image
        };
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();

        let mut count = 0u64;
        let (mut sum_x, mut sum_y) = (0u64, 0u64);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);

        for (x, y, px) in rgb.enumerate_pixels() {
            if Self::is_skin(*px) {
                count += 1;
                sum_x += u64::from(x);
                sum_y += u64::from(y);
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        let coverage = count as f32 / (u64::from(w) * u64::from(h)) as f32;
        if count == 0 || coverage < self.min_fraction {
            return Ok(Vec::new());
        }

        // Pixel centers, normalized.
        let nx = |x: f64| ((x + 0.5) / f64::from(w)) as f32;
        let ny = |y: f64| ((y + 0.5) / f64::from(h)) as f32;
        let centroid = Landmark::new(
            nx(sum_x as f64 / count as f64),
            ny(sum_y as f64 / count as f64),
            coverage,
        );
        let top_left = Landmark::new(nx(f64::from(min_x)), ny(f64::from(min_y)), coverage);
        let bottom_right = Landmark::new(nx(f64::from(max_x)), ny(f64::from(max_y)), coverage);

        Ok(vec![Hand {
            points: vec![centroid, top_left, bottom_right],
        }])
    }
}
