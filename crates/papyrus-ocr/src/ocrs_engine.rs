// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process OCR engine backed by `ocrs`.
//
// Only built with the `ocr` feature. Needs the two `.rten` models that
// `ocrs-cli` downloads on first use (`text-detection.rten` and
// `text-recognition.rten`), by default from `$XDG_CACHE_HOME/ocrs`.
//
// `ocrs` recognises Latin script only; the language argument is accepted for
// interface compatibility and otherwise ignored.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngineParams, OcrInput, TextItem};
use papyrus_core::error::{PapyrusError, Result};
use rten::Model;
use tracing::{debug, info, instrument};

use crate::engine::OcrEngine;
use crate::hocr::{self, HocrLine};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where the two models live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrsConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrsConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrsConfig {
    /// Expects `text-detection.rten` and `text-recognition.rten` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (kind, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.exists() {
                return Err(PapyrusError::ExtractionFailure(format!(
                    "{} model not found at {}; run `ocrs-cli` once to download models",
                    kind,
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// [`OcrEngine`] running `ocrs` models in-process.
///
/// Model loading is the expensive part; build one engine and share it.
pub struct OcrsEngine {
    engine: ocrs::OcrEngine,
}

impl OcrsEngine {
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: OcrsConfig) -> Result<Self> {
        config.validate()?;

        let detection_model = load_model(&config.detection_model_path)?;
        let recognition_model = load_model(&config.recognition_model_path)?;

        let engine = ocrs::OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| {
            PapyrusError::ExtractionFailure(format!("failed to initialise ocrs: {}", err))
        })?;

        info!("ocrs engine ready");
        Ok(Self { engine })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(OcrsConfig::default())
    }

    fn prepare(&self, image: &DynamicImage) -> Result<OcrInput> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            PapyrusError::ExtractionFailure(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;
        self.engine
            .prepare_input(source)
            .map_err(|err| PapyrusError::ExtractionFailure(format!("preprocessing failed: {}", err)))
    }

    /// Recognised lines with their bounding boxes, empty lines dropped.
    fn lines(&self, image: &DynamicImage) -> Result<Vec<HocrLine>> {
        let input = self.prepare(image)?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|err| PapyrusError::ExtractionFailure(format!("word detection failed: {}", err)))?;
        let line_rects = self.engine.find_text_lines(&input, &words);
        let recognised = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| {
                PapyrusError::ExtractionFailure(format!("line recognition failed: {}", err))
            })?;

        let lines: Vec<HocrLine> = recognised
            .iter()
            .flatten()
            .filter_map(|line| {
                let text = line.to_string();
                if text.trim().is_empty() {
                    return None;
                }
                let rect: rten_imageproc::Rect = line.bounding_rect();
                let clamp = |v: i32| v.max(0) as u32;
                Some(HocrLine {
                    text,
                    bbox: (
                        clamp(rect.left()),
                        clamp(rect.top()),
                        clamp(rect.right()),
                        clamp(rect.bottom()),
                    ),
                })
            })
            .collect();

        debug!(words = words.len(), lines = lines.len(), "layout recognised");
        Ok(lines)
    }
}

impl OcrEngine for OcrsEngine {
    #[instrument(skip(self), fields(image = %image.display()))]
    fn extract_txt(&self, image: &Path, _lang: &str) -> Result<String> {
        let image = open_image(image)?;
        let input = self.prepare(&image)?;
        self.engine
            .get_text(&input)
            .map_err(|err| PapyrusError::ExtractionFailure(format!("recognition failed: {}", err)))
    }

    #[instrument(skip(self), fields(image = %image.display()))]
    fn extract_hocr(&self, image: &Path, _lang: &str) -> Result<String> {
        let image = open_image(image)?;
        let lines = self.lines(&image)?;
        hocr::document(image.width(), image.height(), &lines)
    }
}

fn load_model(path: &Path) -> Result<Model> {
    Model::load_file(path).map_err(|err| {
        PapyrusError::ExtractionFailure(format!(
            "failed to load model from {}: {}",
            path.display(),
            err
        ))
    })
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|err| {
        PapyrusError::Image(format!("failed to open {}: {}", path.display(), err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_dir() {
        let config = OcrsConfig::from_dir("/tmp/models");
        assert_eq!(
            config.detection_model_path,
            PathBuf::from("/tmp/models/text-detection.rten")
        );
        assert_eq!(
            config.recognition_model_path,
            PathBuf::from("/tmp/models/text-recognition.rten")
        );
    }

    #[test]
    fn missing_models_fail_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = OcrsConfig::from_dir(dir.path()).validate().unwrap_err();
        assert!(err.to_string().contains("detection model not found"));
        assert!(OcrsEngine::new(OcrsConfig::from_dir(dir.path())).is_err());
    }
}
