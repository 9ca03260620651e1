// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF page editor — count, remove, reorder and rotate pages of an existing
// PDF using the `lopdf` crate. Every edit produces a new file; the source is
// never written back.

use std::collections::BTreeSet;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use papyrus_core::error::{PapyrusError, Result};
use tracing::{debug, info, instrument, warn};

use crate::atomic::write_atomically;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `/Parent` chains in damaged files.
const MAX_TREE_DEPTH: usize = 64;

/// Reads a PDF and applies page-level edits to an in-memory copy.
pub struct PdfEditor {
    /// The underlying lopdf document.
    document: Document,
}

impl PdfEditor {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            PapyrusError::CorruptDocument(format!(
                "failed to open PDF {}: {}",
                path_ref.display(),
                err
            ))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");
        Ok(Self { document })
    }

    /// Create an editor from raw PDF bytes already in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            PapyrusError::CorruptDocument(format!("failed to load PDF from memory: {}", err))
        })?;
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    // -- Edits ----------------------------------------------------------------

    /// Drop the given 1-based pages, keeping the rest in order.
    #[instrument(skip(self, pages))]
    pub fn remove_pages(&mut self, pages: &BTreeSet<u32>) -> Result<()> {
        let total = self.page_count();
        if let Some(bad) = pages.iter().find(|&&page| page == 0 || page > total) {
            return Err(PapyrusError::InvalidInput(format!(
                "cannot remove page {} (document has {} pages)",
                bad, total
            )));
        }
        let survivors: Vec<u32> = (1..=total).filter(|page| !pages.contains(page)).collect();
        if survivors.is_empty() {
            return Err(PapyrusError::InvalidInput(
                "cannot remove every page of a document".into(),
            ));
        }

        info!(removed = pages.len(), remaining = survivors.len(), "Removing pages");
        self.rebuild_page_tree(&survivors)
    }

    /// Rearrange pages so that new page `i + 1` is old page `order[i]`.
    ///
    /// `order` must be a permutation of `1..=page_count`.
    #[instrument(skip(self, order))]
    pub fn reorder_pages(&mut self, order: &[u32]) -> Result<()> {
        let total = self.page_count();
        let mut expected: Vec<u32> = order.to_vec();
        expected.sort_unstable();
        if expected != (1..=total).collect::<Vec<u32>>() {
            return Err(PapyrusError::InvalidReorder(format!(
                "{:?} is not a permutation of 1..={}",
                order, total
            )));
        }

        info!(?order, "Reordering pages");
        self.rebuild_page_tree(order)
    }

    /// Rotate pages clockwise by the given angles (multiples of 90), relative
    /// to their current orientation.
    #[instrument(skip(self, rotations))]
    pub fn rotate_pages(&mut self, rotations: &[(u32, i32)]) -> Result<()> {
        let pages = self.document.get_pages();

        for &(page_number, degrees) in rotations {
            if degrees % 90 != 0 {
                return Err(PapyrusError::InvalidInput(format!(
                    "rotation must be a multiple of 90, got {}",
                    degrees
                )));
            }

            let page_id = *pages.get(&page_number).ok_or_else(|| {
                PapyrusError::InvalidInput(format!(
                    "page {} not found (document has {} pages)",
                    page_number,
                    pages.len()
                ))
            })?;

            // /Rotate is inheritable, so the effective value may live on an ancestor.
            let existing_rotation = inherited_attribute(&self.document, page_id, b"Rotate")
                .and_then(|obj| obj.as_i64().ok())
                .unwrap_or(0)
                .rem_euclid(360) as i32;
            let new_rotation = (existing_rotation + degrees.rem_euclid(360)).rem_euclid(360);

            let dict = self.document.get_dictionary_mut(page_id).map_err(|err| {
                PapyrusError::Pdf(format!("page {} is not a dictionary: {}", page_number, err))
            })?;
            dict.set("Rotate", Object::Integer(new_rotation as i64));

            info!(page_number, existing_rotation, new_rotation, "Page rotated");
        }

        Ok(())
    }

    // -- Output ---------------------------------------------------------------

    /// Serialise to bytes.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            PapyrusError::Pdf(format!("failed to serialise PDF: {}", err))
        })?;
        Ok(output)
    }

    /// Write to `path`, creating parent directories as needed. The file is
    /// replaced in one step.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomically(path.as_ref(), &bytes)?;
        info!(bytes = bytes.len(), "PDF written");
        Ok(())
    }

    // -- Helpers --------------------------------------------------------------

    /// Replace the page tree with a single flat `/Pages` node whose kids are
    /// the given old page numbers, in order.
    fn rebuild_page_tree(&mut self, order: &[u32]) -> Result<()> {
        let pages = self.document.get_pages();
        let root_id = root_pages_id(&self.document)?;

        let mut kids = Vec::with_capacity(order.len());
        for page_number in order {
            let page_id = *pages.get(page_number).ok_or_else(|| {
                PapyrusError::Pdf(format!("page {} not found in page tree", page_number))
            })?;

            // Detach from intermediate nodes without losing inherited attributes.
            let inherited: Vec<(&[u8], Object)> = INHERITABLE
                .iter()
                .filter_map(|key| {
                    inherited_attribute(&self.document, page_id, key).map(|value| (*key, value))
                })
                .collect();

            let dict = self.document.get_dictionary_mut(page_id).map_err(|err| {
                PapyrusError::Pdf(format!("page {} is not a dictionary: {}", page_number, err))
            })?;
            for (key, value) in inherited {
                if !dict.has(key) {
                    dict.set(key.to_vec(), value);
                }
            }
            dict.set("Parent", Object::Reference(root_id));
            kids.push(Object::Reference(page_id));
        }

        let root = self.document.get_dictionary_mut(root_id).map_err(|err| {
            PapyrusError::Pdf(format!("/Pages is not a dictionary: {}", err))
        })?;
        root.set("Count", Object::Integer(kids.len() as i64));
        root.set("Kids", Object::Array(kids));

        let pruned = self.document.prune_objects();
        debug!(pruned = pruned.len(), "Unreachable objects pruned");
        Ok(())
    }
}

/// Object id of the catalog's `/Pages` node.
fn root_pages_id(document: &Document) -> Result<ObjectId> {
    document
        .catalog()
        .map_err(|err| PapyrusError::CorruptDocument(format!("no catalog: {}", err)))?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|err| PapyrusError::CorruptDocument(format!("no /Pages reference: {}", err)))
}

/// Look `key` up on the page, then on each ancestor.
fn inherited_attribute(document: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current: &Dictionary = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = document.get_dictionary(parent_id).ok()?;
    }
    warn!(?page_id, "page tree deeper than {} levels", MAX_TREE_DEPTH);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn editor(pages: u32) -> PdfEditor {
        PdfEditor::from_bytes(&fixtures::pdf_with_pages(pages)).expect("load fixture")
    }

    #[test]
    fn remove_middle_page() {
        let mut pdf = editor(3);
        pdf.remove_pages(&BTreeSet::from([2])).expect("remove");
        let bytes = pdf.to_bytes().expect("save");
        assert_eq!(fixtures::page_labels(&bytes), vec!["page 1", "page 3"]);
    }

    #[test]
    fn removed_pages_keep_inherited_media_box() {
        let mut pdf = editor(2);
        pdf.remove_pages(&BTreeSet::from([1])).expect("remove");
        let bytes = pdf.to_bytes().expect("save");

        let doc = Document::load_mem(&bytes).expect("reload");
        let page_id = *doc.get_pages().get(&1).expect("page 1");
        let page = doc.get_dictionary(page_id).expect("page dict");
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }

    #[test]
    fn removing_every_page_is_rejected() {
        let mut pdf = editor(2);
        let result = pdf.remove_pages(&BTreeSet::from([1, 2]));
        assert!(matches!(result, Err(PapyrusError::InvalidInput(_))));
    }

    #[test]
    fn removing_unknown_page_is_rejected() {
        let mut pdf = editor(2);
        let result = pdf.remove_pages(&BTreeSet::from([3]));
        assert!(matches!(result, Err(PapyrusError::InvalidInput(_))));
    }

    #[test]
    fn reorder_applies_permutation() {
        let mut pdf = editor(3);
        pdf.reorder_pages(&[3, 1, 2]).expect("reorder");
        let bytes = pdf.to_bytes().expect("save");
        assert_eq!(
            fixtures::page_labels(&bytes),
            vec!["page 3", "page 1", "page 2"]
        );
    }

    #[test]
    fn reorder_rejects_partial_permutation() {
        let mut pdf = editor(3);
        let result = pdf.reorder_pages(&[1, 1, 2]);
        assert!(matches!(result, Err(PapyrusError::InvalidReorder(_))));
    }

    #[test]
    fn rotate_is_relative_and_normalised() {
        let mut pdf = editor(2);
        pdf.rotate_pages(&[(2, 270)]).expect("rotate");
        pdf.rotate_pages(&[(2, 180)]).expect("rotate again");
        let bytes = pdf.to_bytes().expect("save");

        let doc = Document::load_mem(&bytes).expect("reload");
        let page_id = *doc.get_pages().get(&2).expect("page 2");
        let rotate = doc
            .get_dictionary(page_id)
            .expect("dict")
            .get(b"Rotate")
            .and_then(Object::as_i64)
            .expect("rotate set");
        assert_eq!(rotate, 90);
    }

    #[test]
    fn rotate_accepts_extreme_angles() {
        // 2147483610 is a multiple of 90 and congruent to 90 mod 360.
        let mut pdf = editor(1);
        pdf.rotate_pages(&[(1, 270)]).expect("rotate");
        pdf.rotate_pages(&[(1, 2_147_483_610)]).expect("rotate by huge angle");
        pdf.rotate_pages(&[(1, -2_147_483_610)]).expect("rotate back");
        let bytes = pdf.to_bytes().expect("save");

        let doc = Document::load_mem(&bytes).expect("reload");
        let page_id = *doc.get_pages().get(&1).expect("page 1");
        let rotate = doc
            .get_dictionary(page_id)
            .expect("dict")
            .get(b"Rotate")
            .and_then(Object::as_i64)
            .expect("rotate set");
        assert_eq!(rotate, 270);
    }

    #[test]
    fn rotate_rejects_odd_angles() {
        let mut pdf = editor(1);
        assert!(pdf.rotate_pages(&[(1, 45)]).is_err());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("v2").join("nested").join("doc.pdf");
        let mut pdf = editor(1);
        pdf.save(&target).expect("save");
        assert_eq!(PdfEditor::open(&target).expect("open").page_count(), 1);
    }
}
