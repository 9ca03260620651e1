// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — wrap raster frames into a PDF using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::Path;

use image::DynamicImage;
use papyrus_core::error::{PapyrusError, Result};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument};

use crate::atomic::write_atomically;

/// Resolution frames are assumed to have when no better information exists.
pub const DEFAULT_DPI: f32 = 150.0;

const MM_PER_INCH: f32 = 25.4;

/// Creates image-only PDFs, one page per frame.
///
/// Pages are sized to the frame at the configured dpi, so rasterising the PDF
/// again at that dpi gives back the original pixel geometry.
pub struct PdfWriter {
    dpi: f32,
    /// Title metadata embedded in the PDF /Info dictionary.
    title: Option<String>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new(DEFAULT_DPI)
    }
}

impl PdfWriter {
    pub fn new(dpi: f32) -> Self {
        Self { dpi, title: None }
    }

    /// Set a title for the PDF metadata.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Build a PDF with one page per image.
    #[instrument(skip_all, fields(frames = images.len()))]
    pub fn create_from_images(&self, images: &[DynamicImage]) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(PapyrusError::InvalidInput(
                "cannot build a PDF from zero images".into(),
            ));
        }

        let title = self.title.as_deref().unwrap_or("Papyrus Document");
        let mut doc = PdfDocument::new(title);
        let mut pages = Vec::with_capacity(images.len());

        for image in images {
            let width = image.width() as usize;
            let height = image.height() as usize;

            // Convert to RGB8 for printpdf.
            let rgb_image = image.to_rgb8();
            let raw = RawImage {
                pixels: RawImageData::U8(rgb_image.into_raw()),
                width,
                height,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let page_w = Mm(width as f32 / self.dpi * MM_PER_INCH);
            let page_h = Mm(height as f32 / self.dpi * MM_PER_INCH);

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: None,
                    scale_y: None,
                    dpi: Some(self.dpi),
                    rotate: None,
                },
            }];

            debug!(width, height, page_w = page_w.0, page_h = page_h.0, "Frame placed on page");
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

        info!(pages = images.len(), bytes = output.len(), "Image PDF created");
        Ok(output)
    }

    /// Build a PDF from `images` and write it to `path`.
    pub fn write_images_to_file(&self, images: &[DynamicImage], path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.create_from_images(images)?;
        write_atomically(path.as_ref(), &bytes)?;
        info!("Wrote image PDF to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PdfEditor;
    use image::{GrayImage, Luma};

    #[test]
    fn one_page_per_frame() {
        let frames: Vec<DynamicImage> = (0..3)
            .map(|shade| DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 40, Luma([shade * 50]))))
            .collect();
        let bytes = PdfWriter::default()
            .create_from_images(&frames)
            .expect("create");
        let editor = PdfEditor::from_bytes(&bytes).expect("reload");
        assert_eq!(editor.page_count(), 3);
    }

    #[test]
    fn zero_frames_rejected() {
        let result = PdfWriter::default().create_from_images(&[]);
        assert!(matches!(result, Err(PapyrusError::InvalidInput(_))));
    }
}
