// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — load, normalise and resize page images for the rendering
// steps. Operates on in-memory images using the `image` crate.

use std::path::Path;

use image::DynamicImage;
use papyrus_core::error::{PapyrusError, Result};
use tracing::{debug, info, instrument};

/// Image processing pipeline operating on a single in-memory image.
///
/// Transformations consume `self` and return a new `ImageProcessor`, enabling
/// method chaining.
///
/// ```ignore
/// ImageProcessor::open("upload.jpg")?
///     .normalize()
///     .resize_to_width(800)
///     .save("page.png")?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path.as_ref()).map_err(|err| {
            PapyrusError::Image(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Consume the processor and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Drop alpha and exotic sample formats: 8-bit gray stays gray, everything
    /// else becomes 8-bit RGB.
    pub fn normalize(self) -> Self {
        let image = match self.image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => self.image,
            DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
                DynamicImage::ImageLuma8(self.image.to_luma8())
            }
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Self { image }
    }

    /// Scale to `width` pixels wide, preserving aspect ratio. Images already
    /// narrower than `width` are left alone rather than upscaled.
    #[instrument(skip(self), fields(width))]
    pub fn resize_to_width(self, width: u32) -> Self {
        let (from_w, from_h) = (self.image.width(), self.image.height());
        if from_w <= width || from_w == 0 {
            return self;
        }
        let height = ((from_h as u64 * width as u64) / from_w as u64).max(1) as u32;
        let resized = self
            .image
            .resize_exact(width, height, image::imageops::FilterType::Lanczos3);
        debug!(from_w, from_h, new_w = width, new_h = height, "Resize complete");
        Self { image: resized }
    }

    // -- Output ---------------------------------------------------------------

    /// Write the image to a file, creating parent directories. The format is
    /// inferred from the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.image.save(path).map_err(|err| {
            PapyrusError::Image(format!("failed to save image to {}: {}", path.display(), err))
        })?;
        info!(path = %path.display(), width = self.width(), height = self.height(), "Image saved");
        Ok(())
    }
}

/// Width and height of the image at `path` without decoding pixel data.
pub fn image_dimensions(path: impl AsRef<Path>) -> Result<(u32, u32)> {
    image::image_dimensions(path.as_ref()).map_err(|err| {
        PapyrusError::Image(format!(
            "cannot read dimensions of {}: {}",
            path.as_ref().display(),
            err
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn resize_preserves_aspect_ratio() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 200, Rgba([1, 2, 3, 255])));
        let resized = ImageProcessor::from_dynamic(img).resize_to_width(100);
        assert_eq!((resized.width(), resized.height()), (100, 50));
    }

    #[test]
    fn never_upscales() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(50, 80));
        let resized = ImageProcessor::from_dynamic(img).resize_to_width(800);
        assert_eq!((resized.width(), resized.height()), (50, 80));
    }

    #[test]
    fn normalize_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let normalized = ImageProcessor::from_dynamic(img).normalize().into_dynamic();
        assert!(matches!(normalized, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn save_then_read_dimensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a").join("page.png");
        let img = DynamicImage::ImageRgba8(RgbaImage::new(12, 34));
        ImageProcessor::from_dynamic(img)
            .normalize()
            .save(&path)
            .expect("save");
        assert_eq!(image_dimensions(&path).expect("dims"), (12, 34));
    }
}
