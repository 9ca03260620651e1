// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: file kinds, document/page addressing, rendering steps and
// document versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PapyrusError, Result};

/// Content type of an uploaded document, as far as the worker cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Pdf,
    /// PNG or JPEG, always a single page.
    Image,
    Tiff,
    Dicom,
    Unknown,
}

impl FileKind {
    /// MIME type string, mostly for log lines.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Image => "image/png",
            Self::Tiff => "image/tiff",
            Self::Dicom => "application/dicom",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Infer a kind from a file extension (secondary heuristic only).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "png" | "jpg" | "jpeg" => Self::Image,
            "tif" | "tiff" => Self::Tiff,
            "dcm" | "dicom" => Self::Dicom,
            _ => Self::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Addressing key of a document's backing file within one version.
///
/// This is a value, not a handle: nothing is locked or opened by holding one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentPath {
    pub owner_id: u64,
    pub document_id: u64,
    pub file_name: String,
    pub version: u32,
}

impl DocumentPath {
    pub fn new(owner_id: u64, document_id: u64, file_name: impl Into<String>, version: u32) -> Self {
        Self {
            owner_id,
            document_id,
            file_name: file_name.into(),
            version,
        }
    }

    /// Directory holding the backing file, relative to the media root.
    pub fn dir_url(&self) -> String {
        format!(
            "docs/user_{}/document_{}/v{}",
            self.owner_id, self.document_id, self.version
        )
    }

    /// Relative url of the backing file.
    pub fn url(&self) -> String {
        format!("{}/{}", self.dir_url(), self.file_name)
    }

    /// Relative directory holding every page artifact of this version.
    pub fn results_url(&self) -> String {
        format!(
            "results/user_{}/document_{}/v{}",
            self.owner_id, self.document_id, self.version
        )
    }

    /// Same document and version, different backing file (e.g. a converted PDF).
    pub fn with_file_name(&self, file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..self.clone()
        }
    }

    /// Same document and file name, different version.
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

// -- Steps ------------------------------------------------------------------

/// One rendering tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position, low to high resolution.
    pub ordinal: u32,
    /// Target image width in pixels.
    pub width: u32,
    /// Thumbnail tiers are rendered but never OCR'd.
    pub thumbnail: bool,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step_{}", self.ordinal)
    }
}

/// Configuration entry for one step. Ordinals are assigned by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub width: u32,
    #[serde(default)]
    pub thumbnail: bool,
}

/// The process-wide ordered set of rendering steps.
///
/// `iter()` can be called any number of times; each call restarts at step 1.
/// Serialised as its list of [`StepSpec`]s; deserialising validates like
/// [`Steps::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StepSpec>", into = "Vec<StepSpec>")]
pub struct Steps {
    steps: Vec<Step>,
}

impl Steps {
    /// Build the step list from configuration, sorted by width.
    ///
    /// Fails if the list is empty, a width is zero, or every step is a
    /// thumbnail (there would be nothing to OCR).
    pub fn new(specs: &[StepSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(PapyrusError::InvalidInput(
                "at least one rendering step is required".into(),
            ));
        }
        if specs.iter().any(|spec| spec.width == 0) {
            return Err(PapyrusError::InvalidInput(
                "rendering step width must be positive".into(),
            ));
        }
        if specs.iter().all(|spec| spec.thumbnail) {
            return Err(PapyrusError::InvalidInput(
                "at least one rendering step must not be thumbnail-only".into(),
            ));
        }

        let mut sorted = specs.to_vec();
        sorted.sort_by_key(|spec| spec.width);

        let steps = sorted
            .into_iter()
            .zip(1u32..)
            .map(|(spec, ordinal)| Step {
                ordinal,
                width: spec.width,
                thumbnail: spec.thumbnail,
            })
            .collect();

        Ok(Self { steps })
    }

    /// Fresh iterator over every step in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// Steps that get an hOCR layout document.
    pub fn ocr_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|step| !step.thumbnail)
    }

    /// The step plain text is extracted from: the lowest-resolution step that
    /// is not thumbnail-only.
    pub fn text_step(&self) -> Step {
        // Construction guarantees at least one non-thumbnail step.
        self.steps
            .iter()
            .copied()
            .find(|step| !step.thumbnail)
            .unwrap_or(self.steps[self.steps.len() - 1])
    }

    pub fn first(&self) -> Step {
        self.steps[0]
    }

    pub fn get(&self, ordinal: u32) -> Option<Step> {
        self.steps.iter().copied().find(|step| step.ordinal == ordinal)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl TryFrom<Vec<StepSpec>> for Steps {
    type Error = PapyrusError;

    fn try_from(specs: Vec<StepSpec>) -> Result<Self> {
        Self::new(&specs)
    }
}

impl From<Steps> for Vec<StepSpec> {
    fn from(steps: Steps) -> Self {
        steps
            .steps
            .into_iter()
            .map(|step| StepSpec {
                width: step.width,
                thumbnail: step.thumbnail,
            })
            .collect()
    }
}

impl Default for Steps {
    /// Thumbnail (200 px), preview (800 px), OCR resolution (1654 px, ~200 dpi A4).
    fn default() -> Self {
        Self {
            steps: vec![
                Step {
                    ordinal: 1,
                    width: 200,
                    thumbnail: true,
                },
                Step {
                    ordinal: 2,
                    width: 800,
                    thumbnail: false,
                },
                Step {
                    ordinal: 3,
                    width: 1654,
                    thumbnail: false,
                },
            ],
        }
    }
}

impl<'a> IntoIterator for &'a Steps {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

// -- Page addressing ----------------------------------------------------------

/// Address of every artifact of one page at one step of one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagePath {
    pub document_path: DocumentPath,
    /// 1-based page number within the version.
    pub page_num: u32,
    pub step: Step,
    /// Total pages of the version.
    pub page_count: u32,
}

impl PagePath {
    pub fn new(document_path: DocumentPath, page_num: u32, step: Step, page_count: u32) -> Self {
        Self {
            document_path,
            page_num,
            step,
            page_count,
        }
    }

    /// Same page, another step.
    pub fn at_step(&self, step: Step) -> Self {
        Self {
            step,
            ..self.clone()
        }
    }

    fn page_url(&self) -> String {
        format!(
            "{}/pages/page_{}",
            self.document_path.results_url(),
            self.page_num
        )
    }

    fn step_url(&self) -> String {
        format!("{}/{}", self.page_url(), self.step)
    }

    /// Rendered page image for this step.
    pub fn img_url(&self) -> String {
        format!("{}/page.png", self.step_url())
    }

    /// hOCR layout document for this step.
    pub fn hocr_url(&self) -> String {
        format!("{}/page.hocr", self.step_url())
    }

    /// Plain text of the page. Extracted once per page, so not step-scoped.
    pub fn txt_url(&self) -> String {
        format!("{}/page.txt", self.page_url())
    }
}

// -- Versions -----------------------------------------------------------------

/// One page of a document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    /// Free-form key/value metadata (e.g. DICOM elements), as JSON.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Immutable snapshot of a document at one version number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub owner_id: u64,
    pub document_id: u64,
    /// Starts at 1, strictly increasing per document.
    pub number: u32,
    pub file_name: String,
    pub page_count: u32,
    pub pages: Vec<Page>,
    /// Backing file size in bytes, once recorded.
    pub size: Option<u64>,
    /// SHA-256 of the backing file, once recorded.
    pub sha256: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentVersion {
    pub fn document_path(&self) -> DocumentPath {
        DocumentPath::new(
            self.owner_id,
            self.document_id,
            self.file_name.clone(),
            self.number,
        )
    }

    /// Address of `page_num` at `step` within this version.
    pub fn page_path(&self, page_num: u32, step: Step) -> PagePath {
        PagePath::new(self.document_path(), page_num, step, self.page_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialised_steps_are_validated() {
        assert!(serde_json::from_str::<Steps>("[]").is_err());
        assert!(serde_json::from_str::<Steps>(r#"[{"width": 0}]"#).is_err());
        assert!(serde_json::from_str::<Steps>(r#"[{"width": 200, "thumbnail": true}]"#).is_err());

        let steps: Steps =
            serde_json::from_str(r#"[{"width": 1654}, {"width": 200, "thumbnail": true}]"#)
                .expect("valid steps");
        assert_eq!(steps.first().width, 200);
        assert_eq!(steps.text_step().width, 1654);

        let json = serde_json::to_string(&Steps::default()).expect("serialise");
        let back: Steps = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, Steps::default());
    }

    fn doc_path() -> DocumentPath {
        DocumentPath::new(7, 42, "scan.pdf", 2)
    }

    #[test]
    fn document_url_layout() {
        assert_eq!(doc_path().url(), "docs/user_7/document_42/v2/scan.pdf");
        assert_eq!(
            doc_path().with_file_name("scan2.pdf").url(),
            "docs/user_7/document_42/v2/scan2.pdf"
        );
        assert_eq!(
            doc_path().with_version(3).url(),
            "docs/user_7/document_42/v3/scan.pdf"
        );
    }

    #[test]
    fn page_urls_are_scoped_by_version_page_and_step() {
        let steps = Steps::default();
        let page = PagePath::new(doc_path(), 3, steps.first(), 5);
        assert_eq!(
            page.img_url(),
            "results/user_7/document_42/v2/pages/page_3/step_1/page.png"
        );
        assert_eq!(
            page.at_step(steps.text_step()).hocr_url(),
            "results/user_7/document_42/v2/pages/page_3/step_2/page.hocr"
        );
        assert_eq!(
            page.txt_url(),
            "results/user_7/document_42/v2/pages/page_3/page.txt"
        );
    }

    #[test]
    fn steps_are_restartable_and_ordered() {
        let steps = Steps::default();
        let first: Vec<u32> = steps.iter().map(|s| s.ordinal).collect();
        let second: Vec<u32> = steps.iter().map(|s| s.ordinal).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
        assert_eq!(steps.ocr_steps().count(), 2);
    }

    #[test]
    fn steps_sorted_by_width_and_renumbered() {
        let steps = Steps::new(&[
            StepSpec {
                width: 1200,
                thumbnail: false,
            },
            StepSpec {
                width: 100,
                thumbnail: true,
            },
        ])
        .expect("valid steps");
        assert_eq!(steps.first().width, 100);
        assert!(steps.first().thumbnail);
        assert_eq!(steps.text_step().ordinal, 2);
    }

    #[test]
    fn all_thumbnail_steps_rejected() {
        let result = Steps::new(&[StepSpec {
            width: 100,
            thumbnail: true,
        }]);
        assert!(matches!(result, Err(PapyrusError::InvalidInput(_))));
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(FileKind::from_extension("TIF"), FileKind::Tiff);
        assert_eq!(FileKind::from_extension("jpeg"), FileKind::Image);
        assert_eq!(FileKind::from_extension("dcm"), FileKind::Dicom);
        assert_eq!(FileKind::from_extension("docx"), FileKind::Unknown);
    }
}
