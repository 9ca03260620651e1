// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — page-level editing of existing PDFs and creating image PDFs.

pub mod editor;
pub mod writer;

pub use editor::PdfEditor;
pub use writer::PdfWriter;
