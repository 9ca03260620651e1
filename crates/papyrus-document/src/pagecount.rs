// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page counting for every accepted upload format.
//
// TIFF files are counted by walking the IFD chain directly, which is much
// cheaper than decoding. Anything the walker cannot make sense of is handed to
// the `tiff` decoder instead.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use lopdf::Document;
use papyrus_core::FileKind;
use papyrus_core::error::{PapyrusError, Result};
use tiff::decoder::Decoder;
use tracing::{debug, instrument, warn};

/// Bytes per IFD entry: tag (2), type (2), count (4), value/offset (4).
const IFD_ENTRY_LEN: u64 = 12;

/// Classic TIFF version marker. BigTIFF (43) is left to the decoder.
const TIFF_VERSION: u16 = 42;

/// Outcome of the raw IFD walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfdWalk {
    /// The chain was walked to its terminating zero offset.
    Counted(u32),
    /// The structure could not be walked; the reason is for logging only.
    NeedsFallback(String),
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        }
    }

    fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }
}

/// Count the pages of the file at `path`.
///
/// `declared` is the content-sniffed kind; the file extension is consulted
/// as well because uploads sometimes arrive as `application/octet-stream`.
#[instrument(skip_all, fields(path = %path.as_ref().display(), declared = declared.mime_type()))]
pub fn page_count(path: impl AsRef<Path>, declared: FileKind) -> Result<u32> {
    let path = path.as_ref();
    if path.is_dir() {
        return Err(PapyrusError::InvalidInput(format!(
            "{} is a directory",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(PapyrusError::InvalidInput(format!(
            "{} is not a file",
            path.display()
        )));
    }

    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(FileKind::from_extension);

    if declared == FileKind::Image || by_extension == Some(FileKind::Image) {
        return Ok(1);
    }
    if declared == FileKind::Tiff || by_extension == Some(FileKind::Tiff) {
        return tiff_page_count(path);
    }
    if declared == FileKind::Dicom || by_extension == Some(FileKind::Dicom) {
        return Ok(1);
    }
    if declared != FileKind::Pdf {
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            if !ext.eq_ignore_ascii_case("pdf") {
                return Err(PapyrusError::UnsupportedFormat(format!(
                    "cannot count pages of .{} files",
                    ext
                )));
            }
        }
    }

    pdf_page_count(path)
}

/// Pages of a PDF. A document with no pages is treated as corrupt.
pub fn pdf_page_count(path: &Path) -> Result<u32> {
    let document = Document::load(path).map_err(|err| {
        PapyrusError::CorruptDocument(format!("cannot parse PDF {}: {}", path.display(), err))
    })?;
    let count = document.get_pages().len() as u32;
    if count == 0 {
        return Err(PapyrusError::CorruptDocument(format!(
            "{} has no pages",
            path.display()
        )));
    }
    debug!(count, "PDF pages counted");
    Ok(count)
}

/// Pages of a TIFF: the IFD walk, or the decoder when the walk gives up.
pub fn tiff_page_count(path: &Path) -> Result<u32> {
    tiff_page_count_with(path, image_library_frame_count)
}

/// Like [`tiff_page_count`], with a caller-supplied fallback counter.
pub fn tiff_page_count_with<F>(path: &Path, fallback: F) -> Result<u32>
where
    F: FnOnce(&Path) -> Result<u32>,
{
    match walk_ifd_chain(path)? {
        IfdWalk::Counted(count) => {
            debug!(count, "TIFF pages counted from IFD chain");
            Ok(count)
        }
        IfdWalk::NeedsFallback(reason) => {
            warn!(path = %path.display(), %reason, "IFD walk failed, decoding frames instead");
            fallback(path)
        }
    }
}

/// Walk the IFD chain of a classic TIFF without decoding any image data.
///
/// Only a failure to open the file is an error; every structural problem is
/// reported as [`IfdWalk::NeedsFallback`].
pub fn walk_ifd_chain(path: &Path) -> Result<IfdWalk> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    match walk(&mut reader, len) {
        Ok(walked) => Ok(walked),
        Err(err) => Ok(IfdWalk::NeedsFallback(err.to_string())),
    }
}

fn walk<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<IfdWalk> {
    let mut marker = [0u8; 2];
    reader.read_exact(&mut marker)?;
    let order = match &marker {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        other => {
            return Ok(IfdWalk::NeedsFallback(format!(
                "unrecognised byte order {:?}",
                String::from_utf8_lossy(other)
            )));
        }
    };

    let version = order.u16(read_array(reader)?);
    if version != TIFF_VERSION {
        return Ok(IfdWalk::NeedsFallback(format!(
            "TIFF version is {}, expected {}",
            version, TIFF_VERSION
        )));
    }

    let mut offset = order.u32(read_array(reader)?) as u64;
    let mut visited = HashSet::new();
    let mut count = 0u32;

    while offset != 0 {
        if offset >= len {
            return Ok(IfdWalk::NeedsFallback(format!(
                "IFD offset {} beyond end of file ({} bytes)",
                offset, len
            )));
        }
        if !visited.insert(offset) {
            return Ok(IfdWalk::NeedsFallback(format!(
                "IFD chain loops back to offset {}",
                offset
            )));
        }
        count += 1;

        reader.seek(SeekFrom::Start(offset))?;
        let tags = order.u16(read_array(reader)?) as u64;
        reader.seek(SeekFrom::Start(offset + 2 + IFD_ENTRY_LEN * tags))?;
        offset = order.u32(read_array(reader)?) as u64;
    }

    Ok(IfdWalk::Counted(count))
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Frame count according to the `tiff` decoder. Slower than the IFD walk but
/// understands BigTIFF and tolerates odd layouts.
pub fn image_library_frame_count(path: &Path) -> Result<u32> {
    let corrupt = |err: tiff::TiffError| {
        PapyrusError::CorruptDocument(format!("cannot decode TIFF {}: {}", path.display(), err))
    };

    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(corrupt)?;
    let mut count = 1u32;
    while decoder.more_images() {
        decoder.next_image().map_err(corrupt)?;
        count += 1;
    }
    Ok(count)
}
