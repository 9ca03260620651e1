// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format adapters — turn TIFF and DICOM uploads into PDFs the page pipeline
// can render. Converted files sit next to the source, named by `converted_path`.

pub mod dicom;
pub mod tiff;

use std::path::{Path, PathBuf};

use papyrus_core::error::{PapyrusError, Result};

pub use self::dicom::{DicomMetadataMap, MetadataValue};
pub use self::tiff::tiff_to_pdf;

/// Where the PDF converted from `upload` lives. Uploads already named `.pdf`
/// get a `.converted.pdf` sibling so the conversion never overwrites them.
pub fn converted_path(upload: &Path) -> PathBuf {
    let named_pdf = upload
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if named_pdf {
        upload.with_extension("converted.pdf")
    } else {
        upload.with_extension("pdf")
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PapyrusError::InvalidInput(format!("{} has no usable file name", path.display()))
        })
}
