// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content-based format classification.
//
// Looks at the leading bytes of a file, never at its name. Callers that get
// `FileKind::Unknown` back may fall back to `FileKind::from_extension`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::ImageFormat;
use papyrus_core::FileKind;
use tracing::{debug, warn};

/// How many leading bytes are inspected.
const SNIFF_LEN: usize = 1024;

/// `%PDF-` may be preceded by junk; libmagic tolerates it within the first KiB.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// DICOM Part 10 files carry a 128-byte preamble followed by `DICM`.
const DICOM_PREAMBLE_LEN: usize = 128;
const DICOM_MAGIC: &[u8] = b"DICM";

/// Classify the file at `path` by content.
///
/// Never fails: unreadable files are reported as [`FileKind::Unknown`].
pub fn classify(path: impl AsRef<Path>) -> FileKind {
    let path = path.as_ref();
    let head = match read_head(path) {
        Ok(head) => head,
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read file for classification");
            return FileKind::Unknown;
        }
    };
    let kind = classify_bytes(&head);
    debug!(path = %path.display(), mime = kind.mime_type(), "classified");
    kind
}

/// Classify an in-memory prefix of a file.
pub fn classify_bytes(head: &[u8]) -> FileKind {
    if head.len() >= DICOM_PREAMBLE_LEN + DICOM_MAGIC.len()
        && &head[DICOM_PREAMBLE_LEN..DICOM_PREAMBLE_LEN + DICOM_MAGIC.len()] == DICOM_MAGIC
    {
        return FileKind::Dicom;
    }

    match image::guess_format(head) {
        Ok(ImageFormat::Png) | Ok(ImageFormat::Jpeg) => return FileKind::Image,
        Ok(ImageFormat::Tiff) => return FileKind::Tiff,
        _ => {}
    }

    if head
        .windows(PDF_MAGIC.len())
        .any(|window| window == PDF_MAGIC)
    {
        return FileKind::Pdf;
    }

    FileKind::Unknown
}

/// Content classification with the extension as a secondary signal.
pub fn classify_with_extension(path: impl AsRef<Path>) -> FileKind {
    let path = path.as_ref();
    match classify(path) {
        FileKind::Unknown => path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(FileKind::from_extension)
            .unwrap_or(FileKind::Unknown),
        kind => kind,
    }
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}
