// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// papyrus-ocr — Turns stored documents into per-page artifacts.
//
// The page pipeline renders every step image of a page, extracts text and
// hOCR through an OCR engine (or synthesises them for DICOM), writes them to
// storage and announces each artifact on the notification bus. The edit
// engine creates new versions after page deletes/reorders/rotations and
// carries unchanged artifacts over so those pages are not OCR'd again.

pub mod edit;
pub mod engine;
pub mod hocr;
pub mod notify;
pub mod pipeline;
pub mod render;

#[cfg(feature = "ocr")]
pub mod ocrs_engine;

pub use edit::{EditOutcome, PageEditor};
pub use engine::{OcrEngine, TesseractEngine};
pub use notify::{NotificationBus, PageEvent};
pub use pipeline::{OcrRequest, PageOutcome, PagePipeline, SourceFormat};
pub use render::{PageRenderer, PopplerRenderer};

#[cfg(feature = "ocr")]
pub use ocrs_engine::OcrsEngine;
