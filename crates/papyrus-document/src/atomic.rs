// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Whole-file writes that readers never observe half-done.

use std::io::Write;
use std::path::Path;

use papyrus_core::error::{PapyrusError, Result};
use tempfile::NamedTempFile;

/// Write `bytes` to a temporary file next to `path`, then rename it over
/// `path`. Parent directories are created as needed.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| PapyrusError::Io(err.error))?;
    Ok(())
}
