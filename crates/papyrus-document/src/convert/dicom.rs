// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DICOM adapter: a searchable metadata map plus a single-page grayscale PDF
// rendering of the first frame.

use std::fmt;
use std::path::Path;

use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_core::value::Value;
use dicom_dictionary_std::{StandardDataDictionary, tags};
use dicom_object::{DefaultDicomObject, InMemDicomObject};
use dicom_pixeldata::PixelDecoder;
use image::{DynamicImage, GrayImage, Luma};
use papyrus_core::error::{PapyrusError, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument};

use crate::pdf::PdfWriter;

/// Gray level used when every sample has the same value.
const FLAT_GRAY: u8 = 128;

/// A retained element value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    /// One nested map per sequence item.
    Sequence(Vec<DicomMetadataMap>),
}

/// Element keyword → value, in dataset order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomMetadataMap(Vec<(String, MetadataValue)>);

impl DicomMetadataMap {
    pub fn get(&self, name: &str) -> Option<&MetadataValue> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        for (key, value) in &self.0 {
            match value {
                MetadataValue::Text(text) => writeln!(f, "{pad}{key}: {text}")?,
                MetadataValue::Sequence(items) => {
                    writeln!(f, "{pad}{key}:")?;
                    for (index, item) in items.iter().enumerate() {
                        writeln!(f, "{pad}  [{}]", index + 1)?;
                        item.write_indented(f, depth + 2)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Renders the map as the page's plain text: `Name: value` lines, sequence
/// items numbered and indented beneath their element.
impl fmt::Display for DicomMetadataMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl Serialize for DicomMetadataMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Read a DICOM Part 10 file.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn open(path: impl AsRef<Path>) -> Result<DefaultDicomObject> {
    let path = path.as_ref();
    dicom_object::open_file(path).map_err(|err| {
        PapyrusError::CorruptDocument(format!("cannot read DICOM {}: {}", path.display(), err))
    })
}

/// Flatten a dataset into a [`DicomMetadataMap`].
///
/// Pixel data, private (odd-group) tags and empty values are left out.
/// Sequences recurse, one nested map per item.
pub fn to_metadata_map(dataset: &InMemDicomObject) -> DicomMetadataMap {
    let mut entries = Vec::new();

    for element in dataset {
        let tag = element.header().tag;
        if tag == tags::PIXEL_DATA || tag.group() % 2 == 1 {
            continue;
        }

        let value = match element.value() {
            Value::Primitive(primitive) => {
                let text = primitive.to_str();
                let text = text.trim_end_matches(['\0', ' ']);
                if text.is_empty() {
                    continue;
                }
                MetadataValue::Text(text.to_string())
            }
            Value::Sequence(sequence) => {
                if sequence.items().is_empty() {
                    continue;
                }
                MetadataValue::Sequence(sequence.items().iter().map(to_metadata_map).collect())
            }
            Value::PixelSequence(_) => continue,
        };

        let name = StandardDataDictionary
            .by_tag(tag)
            .map(|entry| entry.alias().to_string())
            .unwrap_or_else(|| format!("({:04X},{:04X})", tag.group(), tag.element()));
        entries.push((name, value));
    }

    DicomMetadataMap(entries)
}

/// Linearly rescale samples into 0..=255 using their observed range.
///
/// A flat input (min == max) becomes uniform mid-gray.
pub fn normalize_to_gray(samples: &[f32], width: u32, height: u32) -> Result<GrayImage> {
    let needed = width as usize * height as usize;
    if samples.len() < needed || needed == 0 {
        return Err(PapyrusError::CorruptDocument(format!(
            "{} samples cannot fill a {}x{} image",
            samples.len(),
            width,
            height
        )));
    }
    let frame = &samples[..needed];

    let (min, max) = frame
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;

    if range <= f32::EPSILON {
        debug!(min, "Flat pixel data, using mid-gray");
        return Ok(GrayImage::from_pixel(width, height, Luma([FLAT_GRAY])));
    }

    let pixels = frame
        .iter()
        .map(|&v| ((v - min) / range * 255.0) as u8)
        .collect();
    GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| PapyrusError::Image("grayscale buffer size mismatch".into()))
}

/// Render the first frame of `dataset` as a one-page grayscale PDF.
#[instrument(skip_all, fields(output = %output.as_ref().display()))]
pub fn to_pdf(dataset: &DefaultDicomObject, output: impl AsRef<Path>) -> Result<GrayImage> {
    let decoded = dataset.decode_pixel_data().map_err(|err| {
        PapyrusError::CorruptDocument(format!("cannot decode DICOM pixel data: {}", err))
    })?;
    let (width, height) = (decoded.columns(), decoded.rows());
    let channels = decoded.samples_per_pixel().max(1) as usize;

    let samples: Vec<f32> = decoded.to_vec_frame(0).map_err(|err| {
        PapyrusError::CorruptDocument(format!("cannot convert DICOM pixel data: {}", err))
    })?;
    let luminance: Vec<f32> = if channels == 1 {
        samples
    } else {
        samples
            .chunks(channels)
            .map(|px| px.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    let gray = normalize_to_gray(&luminance, width, height)?;
    PdfWriter::default()
        .write_images_to_file(&[DynamicImage::ImageLuma8(gray.clone())], output.as_ref())?;

    info!(width, height, "DICOM rendered to PDF");
    Ok(gray)
}

/// Convert the DICOM file at `path` into a sibling PDF and return the new
/// file name.
pub fn convert(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let dataset = open(path)?;
    let target = super::converted_path(path);
    to_pdf(&dataset, &target)?;
    super::file_name(&target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::pdf::PdfEditor;

    fn sample_map() -> DicomMetadataMap {
        to_metadata_map(&fixtures::dicom_dataset(2, 2, vec![1, 2, 3, 4]))
    }

    #[test]
    fn metadata_skips_pixels_private_tags_and_empties() {
        let map = sample_map();
        assert!(map.get("PixelData").is_none());
        assert!(map.get("Pixel Data").is_none());
        assert!(map.get("Private tag data").is_none());
        assert!(map.get("StudyDescription").is_none());
        assert!(map.keys().all(|key| !key.starts_with("(0009")));
        assert_eq!(
            map.get("PatientName"),
            Some(&MetadataValue::Text("Doe^Jane".into()))
        );
    }

    #[test]
    fn metadata_keeps_dataset_order() {
        let map = sample_map();
        let keys: Vec<&str> = map.keys().collect::<Vec<_>>();
        let patient = keys.iter().position(|k| *k == "PatientName").expect("name");
        let patient_id = keys.iter().position(|k| *k == "PatientID").expect("id");
        assert!(patient < patient_id);
    }

    #[test]
    fn sequences_recurse() {
        let map = sample_map();
        match map.get("ReferencedStudySequence") {
            Some(MetadataValue::Sequence(items)) => {
                assert_eq!(items.len(), 1);
                assert_eq!(
                    items[0].get("ReferencedSOPInstanceUID"),
                    Some(&MetadataValue::Text("2.25.77".into()))
                );
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn display_renders_name_value_lines() {
        let text = sample_map().to_string();
        assert!(text.contains("PatientName: Doe^Jane\n"));
        assert!(text.contains("ReferencedStudySequence:\n  [1]\n    ReferencedSOPClassUID: "));
    }

    #[test]
    fn normalisation_spans_full_range() {
        let img = normalize_to_gray(&[10.0, 20.0, 30.0, 110.0], 2, 2).expect("normalise");
        assert_eq!(img.get_pixel(0, 0).0, [0]);
        assert_eq!(img.get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn flat_input_is_mid_gray() {
        let img = normalize_to_gray(&[7.0; 6], 3, 2).expect("normalise");
        assert!(img.pixels().all(|p| p.0 == [FLAT_GRAY]));
    }

    #[test]
    fn short_buffer_is_corrupt() {
        assert!(normalize_to_gray(&[1.0, 2.0], 2, 2).is_err());
    }

    #[test]
    fn converts_file_to_single_page_pdf() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("ct.dcm");
        fixtures::write_dicom_file(&source, 8, 6, fixtures::gradient_pixels(8, 6));

        let name = convert(&source).expect("convert");
        assert_eq!(name, "ct.pdf");
        let pdf = PdfEditor::open(dir.path().join(name)).expect("open");
        assert_eq!(pdf.page_count(), 1);
    }

    #[test]
    fn unreadable_file_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("bad.dcm");
        std::fs::write(&source, b"not dicom").expect("write");
        assert!(matches!(
            convert(&source),
            Err(PapyrusError::CorruptDocument(_))
        ));
    }

    #[test]
    fn serialises_in_dataset_order() {
        let json = serde_json::to_string(&sample_map()).expect("json");
        let name_at = json.find("PatientName").expect("name");
        let id_at = json.find("PatientID").expect("id");
        assert!(name_at < id_at);
        assert!(!json.contains("PixelData"));
    }
}
