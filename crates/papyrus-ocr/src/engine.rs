// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR engine seam and the Tesseract command-line implementation.

use std::path::{Path, PathBuf};
use std::process::Command;

use papyrus_core::error::{PapyrusError, Result};
use tracing::{debug, instrument};

/// Extracts text and layout from a rendered page image.
///
/// Implementations return the artifact contents; the page pipeline decides
/// where they are written.
pub trait OcrEngine: Send + Sync {
    /// Plain text of the page.
    fn extract_txt(&self, image: &Path, lang: &str) -> Result<String>;

    /// hOCR document of the page.
    fn extract_hocr(&self, image: &Path, lang: &str) -> Result<String>;
}

/// Shells out to the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, image: &Path, lang: &str, config: Option<&str>) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command.arg(image).arg("stdout").arg("-l").arg(lang);
        if let Some(config) = config {
            command.arg(config);
        }

        let output = command.output().map_err(|err| {
            PapyrusError::ExtractionFailure(format!(
                "cannot run {}: {}",
                self.binary.display(),
                err
            ))
        })?;

        if !output.status.success() {
            return Err(PapyrusError::ExtractionFailure(format!(
                "tesseract failed on {} ({}): {}",
                image.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = text.len(), "tesseract finished");
        Ok(text)
    }
}

impl OcrEngine for TesseractEngine {
    #[instrument(skip(self), fields(image = %image.display()))]
    fn extract_txt(&self, image: &Path, lang: &str) -> Result<String> {
        // Tesseract ends every page with a form feed.
        Ok(self.run(image, lang, None)?.replace('\x0c', ""))
    }

    #[instrument(skip(self), fields(image = %image.display()))]
    fn extract_hocr(&self, image: &Path, lang: &str) -> Result<String> {
        self.run(image, lang, Some("hocr"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_extraction_failure() {
        let engine = TesseractEngine::new("/nonexistent/papyrus/tesseract");
        let result = engine.extract_txt(Path::new("page.png"), "eng");
        assert!(matches!(result, Err(PapyrusError::ExtractionFailure(_))));
        assert_eq!(
            result.map_err(|e| e.class()).unwrap_err(),
            papyrus_core::ErrorClass::Retriable
        );
    }
}
