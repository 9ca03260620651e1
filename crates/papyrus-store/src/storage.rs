// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage collaborator — resolves relative artifact urls to files, fetches
// documents that are not present locally, and copies page artifacts between
// versions.

use std::fs;
use std::path::{Path, PathBuf};

use papyrus_core::error::{PapyrusError, Result};
use papyrus_core::{PagePath, Steps};
use tracing::{debug, info, instrument, warn};

/// Everything the page pipeline and the edit engine need from storage.
///
/// Urls are the relative addresses produced by `DocumentPath` and `PagePath`.
pub trait Storage: Send + Sync {
    /// Absolute local path of `url`.
    fn abspath(&self, url: &str) -> PathBuf;

    /// Whether `url` is present locally.
    fn exists(&self, url: &str) -> bool {
        self.abspath(url).is_file()
    }

    /// Make `url` present locally, fetching it from wherever documents are
    /// kept. `namespace` selects a tenant area in multi-tenant setups.
    fn download(&self, url: &str, namespace: Option<&str>) -> Result<()>;

    /// Copy every artifact of page `src` to page `dst`: the image and hOCR of
    /// each step plus the page text. Missing sources are skipped. Returns the
    /// number of files copied.
    fn copy_page(&self, src: &PagePath, dst: &PagePath) -> Result<usize>;

    /// Read a text artifact. `Ok(None)` when it does not exist.
    fn read_text(&self, url: &str) -> Result<Option<String>> {
        let path = self.abspath(url);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    /// Write a text artifact, creating parent directories.
    fn write_text(&self, url: &str, text: &str) -> Result<()> {
        let path = self.abspath(url);
        create_parent(&path)?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// Storage rooted at a local media directory, optionally backed by a mirror
/// directory (a mounted bucket, an NFS export) that downloads copy from.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    media_root: PathBuf,
    mirror_root: Option<PathBuf>,
    steps: Steps,
}

impl LocalStorage {
    pub fn new(media_root: impl Into<PathBuf>, steps: Steps) -> Self {
        Self {
            media_root: media_root.into(),
            mirror_root: None,
            steps,
        }
    }

    /// Fetch missing documents from `mirror_root`.
    pub fn with_mirror(mut self, mirror_root: impl Into<PathBuf>) -> Self {
        self.mirror_root = Some(mirror_root.into());
        self
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn steps(&self) -> &Steps {
        &self.steps
    }

    fn mirror_path(&self, url: &str, namespace: Option<&str>) -> Option<PathBuf> {
        let root = self.mirror_root.as_ref()?;
        Some(match namespace {
            Some(ns) => root.join(ns).join(url),
            None => root.join(url),
        })
    }
}

impl Storage for LocalStorage {
    fn abspath(&self, url: &str) -> PathBuf {
        self.media_root.join(url)
    }

    #[instrument(skip(self))]
    fn download(&self, url: &str, namespace: Option<&str>) -> Result<()> {
        if self.exists(url) {
            debug!("already present locally");
            return Ok(());
        }

        let source = self
            .mirror_path(url, namespace)
            .filter(|path| path.is_file())
            .ok_or_else(|| {
                PapyrusError::InvalidInput(format!("{} not found locally or in the mirror", url))
            })?;

        let target = self.abspath(url);
        create_parent(&target)?;
        let bytes = fs::copy(&source, &target)?;
        info!(bytes, source = %source.display(), "Document downloaded");
        Ok(())
    }

    #[instrument(skip_all, fields(src_page = src.page_num, dst_page = dst.page_num))]
    fn copy_page(&self, src: &PagePath, dst: &PagePath) -> Result<usize> {
        let mut urls = Vec::with_capacity(self.steps.len() * 2 + 1);
        for step in &self.steps {
            let from = src.at_step(*step);
            let to = dst.at_step(*step);
            urls.push((from.img_url(), to.img_url()));
            urls.push((from.hocr_url(), to.hocr_url()));
        }
        urls.push((src.txt_url(), dst.txt_url()));

        let mut copied = 0;
        for (from, to) in urls {
            let from_path = self.abspath(&from);
            if !from_path.is_file() {
                debug!(url = %from, "no artifact to copy");
                continue;
            }
            let to_path = self.abspath(&to);
            create_parent(&to_path)?;
            fs::copy(&from_path, &to_path)?;
            copied += 1;
        }

        if copied == 0 {
            warn!("page had no artifacts to copy");
        }
        debug!(copied, "Page artifacts copied");
        Ok(copied)
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
