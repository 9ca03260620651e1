// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TIFF → PDF: every frame becomes one page of a sibling PDF.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use papyrus_core::error::{PapyrusError, Result};
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, info, instrument};

use crate::pdf::PdfWriter;

/// Convert the TIFF at `path` into a PDF next to it and return the new file
/// name (see [`super::converted_path`]).
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn tiff_to_pdf(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let frames = decode_frames(path)?;
    let target = super::converted_path(path);

    let mut writer = PdfWriter::default();
    if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
        writer.set_title(stem);
    }
    writer.write_images_to_file(&frames, &target)?;

    info!(frames = frames.len(), target = %target.display(), "TIFF converted to PDF");
    super::file_name(&target)
}

/// Decode every frame of a TIFF into memory.
pub fn decode_frames(path: &Path) -> Result<Vec<DynamicImage>> {
    let corrupt = |err: tiff::TiffError| {
        PapyrusError::CorruptDocument(format!("cannot decode TIFF {}: {}", path.display(), err))
    };

    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(corrupt)?;
    let mut frames = Vec::new();

    loop {
        let (width, height) = decoder.dimensions().map_err(corrupt)?;
        let color = decoder.colortype().map_err(corrupt)?;
        let data = decoder.read_image().map_err(corrupt)?;
        debug!(frame = frames.len() + 1, width, height, ?color, "Decoded TIFF frame");
        frames.push(to_dynamic(width, height, color, data)?);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(corrupt)?;
    }

    Ok(frames)
}

fn to_dynamic(
    width: u32,
    height: u32,
    color: ColorType,
    data: DecodingResult,
) -> Result<DynamicImage> {
    let mismatch = || {
        PapyrusError::CorruptDocument(format!(
            "TIFF frame data does not match {}x{} {:?}",
            width, height, color
        ))
    };

    let image = match (color, data) {
        (ColorType::Gray(8), DecodingResult::U8(buf)) => {
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, buf).ok_or_else(mismatch)?)
        }
        (ColorType::GrayA(8), DecodingResult::U8(buf)) => DynamicImage::ImageLumaA8(
            GrayAlphaImage::from_raw(width, height, buf).ok_or_else(mismatch)?,
        ),
        (ColorType::RGB(8), DecodingResult::U8(buf)) => {
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, buf).ok_or_else(mismatch)?)
        }
        (ColorType::RGBA(8), DecodingResult::U8(buf)) => {
            DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, buf).ok_or_else(mismatch)?)
        }
        (ColorType::Gray(16), DecodingResult::U16(buf)) => {
            let scaled: Vec<u8> = buf.iter().map(|&sample| (sample >> 8) as u8).collect();
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, scaled).ok_or_else(mismatch)?)
        }
        // Bilevel scans decode to one bit per sample; widen to 8-bit gray.
        (ColorType::Gray(1), DecodingResult::U8(buf)) => {
            DynamicImage::ImageLuma8(unpack_bilevel(width, height, &buf).ok_or_else(mismatch)?)
        }
        (other, _) => {
            return Err(PapyrusError::UnsupportedFormat(format!(
                "TIFF colour type {:?} is not supported",
                other
            )));
        }
    };
    Ok(image)
}

/// Expand packed 1-bit rows (MSB first, rows padded to whole bytes).
fn unpack_bilevel(width: u32, height: u32, packed: &[u8]) -> Option<GrayImage> {
    let row_bytes = width.div_ceil(8) as usize;
    if packed.len() < row_bytes * height as usize {
        return None;
    }
    let mut out = Vec::with_capacity((width * height) as usize);
    for row in packed.chunks(row_bytes).take(height as usize) {
        for x in 0..width as usize {
            let bit = (row[x / 8] >> (7 - (x % 8))) & 1;
            out.push(if bit == 1 { 255 } else { 0 });
        }
    }
    GrayImage::from_raw(width, height, out)
}
