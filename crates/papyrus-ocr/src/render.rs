// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF page rasterisation.

use std::path::{Path, PathBuf};
use std::process::Command;

use papyrus_core::error::{PapyrusError, Result};
use tracing::{debug, instrument};

/// Renders one PDF page to a PNG of a given width.
pub trait PageRenderer: Send + Sync {
    /// Write page `page` (1-based) of `pdf` to `output`, `width` pixels wide
    /// with the aspect ratio preserved. Parent directories must exist.
    fn render_pdf_page(&self, pdf: &Path, page: u32, width: u32, output: &Path) -> Result<()>;
}

/// Renders with poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PopplerRenderer {
    binary: PathBuf,
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PopplerRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl PageRenderer for PopplerRenderer {
    #[instrument(skip(self), fields(pdf = %pdf.display(), output = %output.display()))]
    fn render_pdf_page(&self, pdf: &Path, page: u32, width: u32, output: &Path) -> Result<()> {
        // pdftoppm appends `.png` to the prefix it is given.
        let prefix = output.with_extension("");

        let status = Command::new(&self.binary)
            .arg("-png")
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-scale-to-x")
            .arg(width.to_string())
            .arg("-scale-to-y")
            .arg("-1")
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix)
            .status()
            .map_err(|err| {
                PapyrusError::ExtractionFailure(format!(
                    "cannot run {}: {}",
                    self.binary.display(),
                    err
                ))
            })?;

        if !status.success() {
            return Err(PapyrusError::ExtractionFailure(format!(
                "pdftoppm failed to render page {} of {} ({})",
                page,
                pdf.display(),
                status
            )));
        }

        debug!(page, width, "page rendered");
        Ok(())
    }
}
