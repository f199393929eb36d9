use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;

/// Width of every feature image, in pixels.
pub const FEATURE_WIDTH: u32 = 50;

/// Height of every feature image, in pixels.
pub const FEATURE_HEIGHT: u32 = 75;

/// Fixed-shape 8-bit grayscale grid compared by the classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureImage {
    image: GrayImage,
}

impl FeatureImage {
    /// Wrap an image as-is. Use [`FeatureImage::normalized`] for crops of
    /// arbitrary size.
    pub fn from_gray(image: GrayImage) -> Self {
        Self { image }
    }

    /// Resize to the feature shape with cubic interpolation when needed.
    pub fn normalized(image: GrayImage) -> Self {
        if image.width() == FEATURE_WIDTH && image.height() == FEATURE_HEIGHT {
            return Self { image };
        }
        Self {
            image: imageops::resize(&image, FEATURE_WIDTH, FEATURE_HEIGHT, FilterType::CatmullRom),
        }
    }

    /// A feature image where every pixel has `value`.
    pub fn uniform(value: u8) -> Self {
        Self {
            image: GrayImage::from_pixel(FEATURE_WIDTH, FEATURE_HEIGHT, image::Luma([value])),
        }
    }

    /// Decode stored template bytes (any format `image` understands).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).context("failed to decode template image")?;
        Ok(Self::normalized(decoded.to_luma8()))
    }

    /// Encode as PNG for storage.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(self.image.clone())
            .write_to(&mut out, ImageFormat::Png)
            .context("failed to encode feature image as PNG")?;
        Ok(out.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major pixel values.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_resizes_to_feature_shape() {
        let crop = GrayImage::from_pixel(120, 40, image::Luma([200]));
        let feature = FeatureImage::normalized(crop);
        assert_eq!(feature.width(), FEATURE_WIDTH);
        assert_eq!(feature.height(), FEATURE_HEIGHT);
        assert_eq!(feature.pixels().len(), (FEATURE_WIDTH * FEATURE_HEIGHT) as usize);
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let mut image = GrayImage::new(FEATURE_WIDTH, FEATURE_HEIGHT);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            pixel.0[0] = ((x * 3 + y) % 256) as u8;
        }
        let feature = FeatureImage::from_gray(image);
        let bytes = feature.encode_png().unwrap();
        assert_eq!(FeatureImage::decode(&bytes).unwrap(), feature);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(FeatureImage::decode(b"not an image").is_err());
    }
}
