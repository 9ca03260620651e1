// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// papyrus-document — Document handling for the Papyrus ingestion worker.
//
// Provides content-based format classification, page counting (with a raw
// TIFF IFD walker), PDF page editing and image-PDF creation, page image
// processing, and the TIFF/DICOM → PDF adapters.

pub mod atomic;
pub mod classify;
pub mod convert;
pub mod image;
pub mod pagecount;
pub mod pdf;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

// Re-export the primary entry points so callers can use `papyrus_document::PdfEditor` etc.
pub use self::classify::{classify, classify_with_extension};
pub use self::convert::{DicomMetadataMap, MetadataValue};
pub use self::image::processor::ImageProcessor;
pub use self::pagecount::{IfdWalk, page_count};
pub use self::pdf::editor::PdfEditor;
pub use self::pdf::writer::PdfWriter;
