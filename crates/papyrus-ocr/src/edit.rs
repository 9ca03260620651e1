// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page edits with artifact reuse.
//
// Each edit allocates a new document version, writes the edited PDF into the
// new version's directory and copies the per-page artifacts (step images,
// hOCR, text) of every page that survives unchanged, so those pages are not
// OCR'd again. Old versions are never touched. If any write fails the new
// version is discarded again, so the latest version always has its file.

use std::collections::{BTreeMap, BTreeSet};

use papyrus_core::error::{PapyrusError, Result};
use papyrus_core::{DocumentVersion, FileKind, Steps};
use papyrus_document::atomic::write_atomically;
use papyrus_document::{PdfEditor, classify};
use papyrus_store::{Storage, VersionCatalog, integrity};
use tracing::{debug, info, instrument, warn};

/// Result of one edit.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    /// The freshly allocated version.
    pub version: DocumentVersion,
    /// `(new_page, old_page)` for every page whose artifacts were carried over.
    pub copied: Vec<(u32, u32)>,
    /// Pages of the new version that need a fresh pipeline run.
    pub stale_pages: Vec<u32>,
}

/// Where each surviving page ends up after deleting `deleted`.
///
/// Returns `(new_number, old_number)` pairs in page order, renumbered
/// contiguously from 1.
pub fn assignments_after_delete(page_count: u32, deleted: &BTreeSet<u32>) -> Result<Vec<(u32, u32)>> {
    if let Some(bad) = deleted.iter().find(|&&page| page == 0 || page > page_count) {
        return Err(PapyrusError::InvalidInput(format!(
            "cannot delete page {} of a {}-page document",
            bad, page_count
        )));
    }
    let assignments: Vec<(u32, u32)> = (1..=page_count)
        .filter(|page| !deleted.contains(page))
        .zip(1u32..)
        .map(|(old, new)| (new, old))
        .collect();
    if assignments.is_empty() {
        return Err(PapyrusError::InvalidInput(
            "cannot delete every page of a document".into(),
        ));
    }
    Ok(assignments)
}

/// Check a reorder given as `(old_number, new_number)` pairs and turn it into
/// the old page for each new position (index 0 = new page 1).
pub fn reorder_to_order(page_count: u32, pairs: &[(u32, u32)]) -> Result<Vec<u32>> {
    if pairs.len() != page_count as usize {
        return Err(PapyrusError::InvalidReorder(format!(
            "{} pairs given for {} pages",
            pairs.len(),
            page_count
        )));
    }

    let mut by_new: BTreeMap<u32, u32> = BTreeMap::new();
    let mut olds = BTreeSet::new();
    for &(old, new) in pairs {
        let in_range = |n: u32| (1..=page_count).contains(&n);
        if !in_range(old) || !in_range(new) {
            return Err(PapyrusError::InvalidReorder(format!(
                "pair ({}, {}) outside 1..={}",
                old, new, page_count
            )));
        }
        if !olds.insert(old) {
            return Err(PapyrusError::InvalidReorder(format!("old page {} listed twice", old)));
        }
        if by_new.insert(new, old).is_some() {
            return Err(PapyrusError::InvalidReorder(format!("new page {} listed twice", new)));
        }
    }
    Ok(by_new.into_values().collect())
}

/// Applies page edits to the latest version of a document.
pub struct PageEditor<'a> {
    catalog: &'a VersionCatalog,
    storage: &'a dyn Storage,
    steps: Steps,
}

impl<'a> PageEditor<'a> {
    pub fn new(catalog: &'a VersionCatalog, storage: &'a dyn Storage, steps: Steps) -> Self {
        Self {
            catalog,
            storage,
            steps,
        }
    }

    /// Remove `pages` from the latest version.
    #[instrument(skip(self, pages), fields(deleted = pages.len()))]
    pub fn delete_pages(&self, document_id: u64, pages: &BTreeSet<u32>) -> Result<EditOutcome> {
        let old = self.latest(document_id)?;
        let assignments = assignments_after_delete(old.page_count, pages)?;

        let mut pdf = self.open_pdf(&old)?;
        pdf.remove_pages(pages)?;
        let bytes = pdf.to_bytes()?;

        let new = self
            .catalog
            .version_bump(document_id, Some(assignments.len() as u32))?;
        self.publish(&old, &new, &bytes, &assignments, &assignments)?;

        info!(from = old.number, to = new.number, pages = new.page_count, "pages deleted");
        Ok(EditOutcome {
            version: new,
            copied: assignments,
            stale_pages: Vec::new(),
        })
    }

    /// Reorder the latest version. `pairs` are `(old_number, new_number)`.
    #[instrument(skip(self, pairs))]
    pub fn reorder_pages(&self, document_id: u64, pairs: &[(u32, u32)]) -> Result<EditOutcome> {
        let old = self.latest(document_id)?;
        let order = reorder_to_order(old.page_count, pairs)?;

        let mut pdf = self.open_pdf(&old)?;
        pdf.reorder_pages(&order)?;
        let bytes = pdf.to_bytes()?;

        let assignments: Vec<(u32, u32)> = order
            .iter()
            .copied()
            .zip(1u32..)
            .map(|(old, new)| (new, old))
            .collect();
        let new = self.catalog.version_bump(document_id, None)?;
        self.publish(&old, &new, &bytes, &assignments, &assignments)?;

        info!(from = old.number, to = new.number, "pages reordered");
        Ok(EditOutcome {
            version: new,
            copied: assignments,
            stale_pages: Vec::new(),
        })
    }

    /// Rotate pages of the latest version by multiples of 90 degrees.
    ///
    /// Artifacts of untouched pages are copied. Rotated pages are reported
    /// as stale: their old images and hOCR coordinates no longer match.
    #[instrument(skip(self, rotations))]
    pub fn rotate_pages(&self, document_id: u64, rotations: &[(u32, i32)]) -> Result<EditOutcome> {
        let old = self.latest(document_id)?;
        for &(page, degrees) in rotations {
            if page == 0 || page > old.page_count {
                return Err(PapyrusError::InvalidInput(format!(
                    "cannot rotate page {} of a {}-page document",
                    page, old.page_count
                )));
            }
            if degrees % 90 != 0 {
                return Err(PapyrusError::InvalidInput(format!(
                    "rotation must be a multiple of 90, got {}",
                    degrees
                )));
            }
        }

        let mut pdf = self.open_pdf(&old)?;
        pdf.rotate_pages(rotations)?;
        let bytes = pdf.to_bytes()?;

        // A full turn leaves the page as it was.
        let mut net: BTreeMap<u32, i32> = BTreeMap::new();
        for &(page, degrees) in rotations {
            let turn = net.entry(page).or_default();
            *turn = (*turn + degrees.rem_euclid(360)).rem_euclid(360);
        }
        let stale_pages: Vec<u32> = net
            .into_iter()
            .filter(|&(_, turn)| turn != 0)
            .map(|(page, _)| page)
            .collect();

        // Rotation keeps page identity: metadata follows every page, artifacts
        // only the pages whose images are still valid.
        let identity: Vec<(u32, u32)> = (1..=old.page_count).map(|page| (page, page)).collect();
        let assignments: Vec<(u32, u32)> = identity
            .iter()
            .copied()
            .filter(|(page, _)| !stale_pages.contains(page))
            .collect();
        let new = self.catalog.version_bump(document_id, None)?;
        self.publish(&old, &new, &bytes, &assignments, &identity)?;

        info!(
            from = old.number,
            to = new.number,
            stale = stale_pages.len(),
            "pages rotated"
        );
        Ok(EditOutcome {
            version: new,
            copied: assignments,
            stale_pages,
        })
    }

    // -- Helpers --------------------------------------------------------------

    fn latest(&self, document_id: u64) -> Result<DocumentVersion> {
        self.catalog.latest_version(document_id)?.ok_or_else(|| {
            PapyrusError::InvalidInput(format!("document {} does not exist", document_id))
        })
    }

    fn open_pdf(&self, version: &DocumentVersion) -> Result<PdfEditor> {
        let path = self.storage.abspath(&version.document_path().url());
        match classify(&path) {
            FileKind::Pdf => PdfEditor::open(&path),
            other => Err(PapyrusError::UnsupportedFormat(format!(
                "page edits need a PDF, {} is {}",
                version.file_name,
                other.mime_type()
            ))),
        }
    }

    /// Write everything the new version needs. On failure the version is
    /// discarded so the previous one stays the latest.
    fn publish(
        &self,
        old: &DocumentVersion,
        new: &DocumentVersion,
        pdf: &[u8],
        artifacts: &[(u32, u32)],
        metadata: &[(u32, u32)],
    ) -> Result<()> {
        let result = self
            .write_pdf(new, pdf)
            .and_then(|()| self.copy_artifacts(old, new, artifacts))
            .and_then(|()| self.copy_metadata(old, new, metadata));
        if let Err(err) = &result {
            warn!(version = new.number, %err, "edit failed, discarding version");
            self.roll_back(new);
        }
        result
    }

    fn write_pdf(&self, version: &DocumentVersion, pdf: &[u8]) -> Result<()> {
        let path = self.storage.abspath(&version.document_path().url());
        write_atomically(&path, pdf)?;
        let (size, sha256) = integrity::hash_file(&path)?;
        self.catalog
            .record_file(version.document_id, version.number, size, &sha256)?;
        debug!(size, %sha256, "backing file recorded");
        Ok(())
    }

    /// Copy artifacts for `(new_page, old_page)` pairs.
    fn copy_artifacts(
        &self,
        old: &DocumentVersion,
        new: &DocumentVersion,
        assignments: &[(u32, u32)],
    ) -> Result<()> {
        // `copy_page` walks every step itself; the address step is arbitrary.
        let step = self.steps.first();
        for &(new_page, old_page) in assignments {
            let src = old.page_path(old_page, step);
            let dst = new.page_path(new_page, step);
            let copied = self.storage.copy_page(&src, &dst)?;
            if copied == 0 {
                warn!(old_page, new_page, "no artifacts to reuse; page needs OCR");
            }
        }
        Ok(())
    }

    /// Copy page metadata for `(new_page, old_page)` pairs.
    fn copy_metadata(
        &self,
        old: &DocumentVersion,
        new: &DocumentVersion,
        assignments: &[(u32, u32)],
    ) -> Result<()> {
        for &(new_page, old_page) in assignments {
            if let Some(metadata) = old
                .pages
                .iter()
                .find(|page| page.number == old_page)
                .and_then(|page| page.metadata.as_ref())
            {
                self.catalog
                    .set_page_metadata(new.document_id, new.number, new_page, metadata)?;
            }
        }
        Ok(())
    }

    fn roll_back(&self, version: &DocumentVersion) {
        if let Err(err) = self
            .catalog
            .discard_version(version.document_id, version.number)
        {
            warn!(version = version.number, %err, "cannot discard version");
        }
        let doc_path = version.document_path();
        for url in [doc_path.dir_url(), doc_path.results_url()] {
            let dir = self.storage.abspath(&url);
            if dir.is_dir() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    warn!(dir = %dir.display(), %err, "cannot remove partial version");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papyrus_document::fixtures;
    use papyrus_store::LocalStorage;
    use serde_json::json;

    struct Harness {
        _dir: tempfile::TempDir,
        catalog: VersionCatalog,
        storage: LocalStorage,
        v1: DocumentVersion,
    }

    /// A 3-page document with a full set of artifacts per page.
    fn harness() -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let steps = Steps::default();
        let storage = LocalStorage::new(dir.path(), steps.clone());
        let catalog = VersionCatalog::open_in_memory().expect("catalog");
        let v1 = catalog.register_document(4, "scan.pdf", 3).expect("register");

        let doc = storage.abspath(&v1.document_path().url());
        std::fs::create_dir_all(doc.parent().expect("parent")).expect("mkdir");
        std::fs::write(&doc, fixtures::pdf_with_pages(3)).expect("write pdf");

        for page in 1..=3 {
            for step in steps.iter() {
                let at = v1.page_path(page, *step);
                storage
                    .write_text(&at.img_url(), &format!("img {page} {}", step.ordinal))
                    .expect("img");
                if !step.thumbnail {
                    storage
                        .write_text(&at.hocr_url(), &format!("hocr {page} {}", step.ordinal))
                        .expect("hocr");
                }
            }
            let at = v1.page_path(page, steps.first());
            storage
                .write_text(&at.txt_url(), &format!("text {page}"))
                .expect("txt");
        }

        Harness {
            _dir: dir,
            catalog,
            storage,
            v1,
        }
    }

    fn text_of(h: &Harness, version: &DocumentVersion, page: u32) -> Option<String> {
        let at = version.page_path(page, Steps::default().first());
        h.storage.read_text(&at.txt_url()).expect("read")
    }

    #[test]
    fn delete_assignments_renumber_survivors() {
        assert_eq!(
            assignments_after_delete(3, &BTreeSet::from([2])).expect("assign"),
            vec![(1, 1), (2, 3)]
        );
        assert!(assignments_after_delete(2, &BTreeSet::from([1, 2])).is_err());
        assert!(assignments_after_delete(2, &BTreeSet::from([5])).is_err());
    }

    #[test]
    fn reorder_validation() {
        assert_eq!(
            reorder_to_order(3, &[(3, 1), (1, 2), (2, 3)]).expect("order"),
            vec![3, 1, 2]
        );
        for bad in [
            vec![(1, 1), (2, 2)],
            vec![(1, 1), (1, 2), (3, 3)],
            vec![(1, 1), (2, 1), (3, 3)],
            vec![(1, 1), (2, 2), (4, 3)],
        ] {
            assert!(matches!(
                reorder_to_order(3, &bad),
                Err(PapyrusError::InvalidReorder(_))
            ));
        }
    }

    #[test]
    fn delete_middle_page_reuses_the_rest() {
        let h = harness();
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        let outcome = editor
            .delete_pages(h.v1.document_id, &BTreeSet::from([2]))
            .expect("delete");

        assert_eq!(outcome.version.number, 2);
        assert_eq!(outcome.version.page_count, 2);
        assert_eq!(outcome.copied, vec![(1, 1), (2, 3)]);
        assert_eq!(text_of(&h, &outcome.version, 2).as_deref(), Some("text 3"));

        let pdf = h.storage.abspath(&outcome.version.document_path().url());
        assert_eq!(
            fixtures::page_labels(&std::fs::read(pdf).expect("read pdf")),
            vec!["page 1", "page 3"]
        );
        // Old version untouched.
        assert_eq!(text_of(&h, &h.v1, 2).as_deref(), Some("text 2"));
        let recorded = h
            .catalog
            .version(h.v1.document_id, 2)
            .expect("get")
            .expect("found");
        assert!(recorded.sha256.is_some());
    }

    #[test]
    fn reorder_copies_are_byte_identical() {
        let h = harness();
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        // new 1 <- old 3, new 2 <- old 1, new 3 <- old 2
        let outcome = editor
            .reorder_pages(h.v1.document_id, &[(3, 1), (1, 2), (2, 3)])
            .expect("reorder");

        assert_eq!(outcome.copied, vec![(1, 3), (2, 1), (3, 2)]);
        for &(new_page, old_page) in &outcome.copied {
            for step in Steps::default().iter() {
                let src = h.storage.abspath(&h.v1.page_path(old_page, *step).img_url());
                let dst = h
                    .storage
                    .abspath(&outcome.version.page_path(new_page, *step).img_url());
                assert_eq!(
                    std::fs::read(src).expect("src"),
                    std::fs::read(dst).expect("dst")
                );
            }
        }
    }

    #[test]
    fn malformed_reorder_allocates_no_version() {
        let h = harness();
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        let result = editor.reorder_pages(h.v1.document_id, &[(1, 1), (1, 2), (3, 3)]);
        assert!(matches!(result, Err(PapyrusError::InvalidReorder(_))));
        let latest = h
            .catalog
            .latest_version(h.v1.document_id)
            .expect("latest")
            .expect("found");
        assert_eq!(latest.number, 1);
    }

    #[test]
    fn rotate_marks_rotated_pages_stale() {
        let h = harness();
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        let outcome = editor
            .rotate_pages(h.v1.document_id, &[(2, 90), (3, 180), (3, 180)])
            .expect("rotate");

        assert_eq!(outcome.stale_pages, vec![2]);
        assert_eq!(outcome.copied, vec![(1, 1), (3, 3)]);
        assert_eq!(text_of(&h, &outcome.version, 2), None);
        assert_eq!(text_of(&h, &outcome.version, 3).as_deref(), Some("text 3"));
    }

    #[test]
    fn rotated_page_keeps_its_metadata() {
        let h = harness();
        h.catalog
            .set_page_metadata(h.v1.document_id, 1, 2, &json!({"Modality": "CT"}))
            .expect("set");
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        let outcome = editor
            .rotate_pages(h.v1.document_id, &[(2, 90)])
            .expect("rotate");

        assert_eq!(outcome.stale_pages, vec![2]);
        assert_eq!(
            h.catalog
                .page_metadata(h.v1.document_id, outcome.version.number, 2)
                .expect("get"),
            Some(json!({"Modality": "CT"}))
        );
    }

    #[test]
    fn extreme_rotation_angles_do_not_overflow() {
        let h = harness();
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        // 2147483610 is congruent to 90 mod 360, so page 1 ends a full turn.
        let outcome = editor
            .rotate_pages(
                h.v1.document_id,
                &[(1, 2_147_483_610), (1, 270), (3, 2_147_483_610)],
            )
            .expect("rotate");
        assert_eq!(outcome.stale_pages, vec![3]);
    }

    #[test]
    fn failed_write_discards_the_new_version() {
        let h = harness();
        let v2_dir = h
            .storage
            .abspath(&h.v1.document_path().with_version(2).dir_url());
        std::fs::create_dir_all(v2_dir.parent().expect("parent")).expect("mkdir");
        std::fs::write(&v2_dir, b"in the way").expect("blocker");

        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        let result = editor.delete_pages(h.v1.document_id, &BTreeSet::from([2]));
        assert!(matches!(result, Err(PapyrusError::Io(_))));
        let latest = h
            .catalog
            .latest_version(h.v1.document_id)
            .expect("latest")
            .expect("found");
        assert_eq!(latest.number, 1);
        assert!(
            !h.storage
                .abspath(&h.v1.document_path().with_version(2).results_url())
                .exists()
        );

        std::fs::remove_file(&v2_dir).expect("remove blocker");
        let outcome = editor
            .delete_pages(h.v1.document_id, &BTreeSet::from([2]))
            .expect("retry");
        assert_eq!(outcome.version.number, 2);
        assert_eq!(text_of(&h, &outcome.version, 2).as_deref(), Some("text 3"));
    }

    #[test]
    fn page_metadata_follows_the_page() {
        let h = harness();
        h.catalog
            .set_page_metadata(h.v1.document_id, 1, 3, &json!({"Modality": "CT"}))
            .expect("set");
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        let outcome = editor
            .delete_pages(h.v1.document_id, &BTreeSet::from([1]))
            .expect("delete");
        assert_eq!(
            h.catalog
                .page_metadata(h.v1.document_id, outcome.version.number, 2)
                .expect("get"),
            Some(json!({"Modality": "CT"}))
        );
    }

    #[test]
    fn non_pdf_documents_cannot_be_edited() {
        let h = harness();
        let doc = h.storage.abspath(&h.v1.document_path().url());
        std::fs::write(&doc, b"II*\0\x08\0\0\0").expect("overwrite");
        let editor = PageEditor::new(&h.catalog, &h.storage, Steps::default());
        let result = editor.delete_pages(h.v1.document_id, &BTreeSet::from([1]));
        assert!(matches!(result, Err(PapyrusError::UnsupportedFormat(_))));
    }
}
