// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page pipeline — one page of one document version, from stored upload to
// published artifacts.
//
// For every page: render an image per step (all steps before any OCR), emit
// `pre_page_ocr`, extract the text once from the text step, then extract an
// hOCR document for every non-thumbnail step. Each artifact is written to
// storage and announced as soon as it exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use papyrus_core::error::{PapyrusError, Result};
use papyrus_core::{DocumentPath, FileKind, PagePath, Step, Steps};
use papyrus_document::convert::{self, DicomMetadataMap};
use papyrus_document::{ImageProcessor, classify_with_extension, pagecount};
use papyrus_store::Storage;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::engine::OcrEngine;
use crate::hocr;
use crate::notify::{self, EventOrigin, NotificationBus};
use crate::render::PageRenderer;

/// One page OCR job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    /// The user asking for the run; reported in every notification.
    pub owner_id: u64,
    pub document_id: u64,
    /// File name of the upload within its version directory.
    pub file_name: String,
    /// 1-based page number.
    pub page_num: u32,
    pub version: u32,
    /// OCR language code, e.g. `eng` or `deu+eng`.
    pub lang: String,
    pub namespace: Option<String>,
}

impl OcrRequest {
    pub fn document_path(&self) -> DocumentPath {
        DocumentPath::new(
            self.owner_id,
            self.document_id,
            self.file_name.clone(),
            self.version,
        )
    }
}

/// How a stored upload is turned into page images and text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceFormat {
    Pdf,
    /// PNG or JPEG, always a single page.
    Image,
    /// Converted to a PDF first, then handled like one.
    TiffDerived,
    /// Converted to a one-page PDF; text and layout are synthesised from the
    /// dataset instead of running OCR.
    DicomDerived,
}

impl SourceFormat {
    /// Pick the handling for a classified file.
    pub fn from_kind(kind: FileKind) -> Result<Self> {
        match kind {
            FileKind::Pdf => Ok(Self::Pdf),
            FileKind::Image => Ok(Self::Image),
            FileKind::Tiff => Ok(Self::TiffDerived),
            FileKind::Dicom => Ok(Self::DicomDerived),
            FileKind::Unknown => Err(PapyrusError::UnsupportedFormat(
                "cannot OCR a file of unknown type".into(),
            )),
        }
    }
}

/// What one successful page run produced.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    /// The page at its text step. `document_path.file_name` is the file the
    /// pages were rendered from (a converted PDF for TIFF and DICOM uploads).
    pub page_path: PagePath,
    pub format: SourceFormat,
    /// DICOM uploads only, for the caller to attach to the page.
    pub metadata: Option<DicomMetadataMap>,
}

// ---------------------------------------------------------------------------
// Page sources
// ---------------------------------------------------------------------------

/// Per-format behaviour driven by [`PagePipeline`].
pub trait PageSource {
    fn page_count(&self) -> Result<u32>;

    /// Write the image of `page_num` at `step` to `output`.
    fn render_step(&self, page_num: u32, step: Step, output: &Path) -> Result<()>;

    /// Render every step of `page`, lowest resolution first.
    fn render_steps(&self, page: &PagePath, steps: &Steps, storage: &dyn Storage) -> Result<()> {
        for step in steps {
            let output = storage.abspath(&page.at_step(*step).img_url());
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.render_step(page.page_num, *step, &output)?;
            debug!(step = step.ordinal, width = step.width, "step rendered");
        }
        Ok(())
    }

    /// Plain text, from the image of the text step.
    fn extract_text(&self, image: &Path, lang: &str) -> Result<String>;

    /// hOCR, from the image of one non-thumbnail step.
    fn extract_layout(&self, image: &Path, lang: &str) -> Result<String>;
}

struct PdfSource<'a> {
    pdf: PathBuf,
    renderer: &'a dyn PageRenderer,
    engine: &'a dyn OcrEngine,
}

impl PageSource for PdfSource<'_> {
    fn page_count(&self) -> Result<u32> {
        pagecount::pdf_page_count(&self.pdf)
    }

    fn render_step(&self, page_num: u32, step: Step, output: &Path) -> Result<()> {
        self.renderer
            .render_pdf_page(&self.pdf, page_num, step.width, output)
    }

    fn extract_text(&self, image: &Path, lang: &str) -> Result<String> {
        self.engine.extract_txt(image, lang)
    }

    fn extract_layout(&self, image: &Path, lang: &str) -> Result<String> {
        self.engine.extract_hocr(image, lang)
    }
}

struct ImageSource<'a> {
    path: PathBuf,
    engine: &'a dyn OcrEngine,
}

impl PageSource for ImageSource<'_> {
    fn page_count(&self) -> Result<u32> {
        Ok(1)
    }

    fn render_step(&self, _page_num: u32, step: Step, output: &Path) -> Result<()> {
        ImageProcessor::open(&self.path)?
            .normalize()
            .resize_to_width(step.width)
            .save(output)
    }

    fn extract_text(&self, image: &Path, lang: &str) -> Result<String> {
        self.engine.extract_txt(image, lang)
    }

    fn extract_layout(&self, image: &Path, lang: &str) -> Result<String> {
        self.engine.extract_hocr(image, lang)
    }
}

struct DicomSource<'a> {
    pdf: PathBuf,
    renderer: &'a dyn PageRenderer,
    metadata: DicomMetadataMap,
}

impl PageSource for DicomSource<'_> {
    fn page_count(&self) -> Result<u32> {
        Ok(1)
    }

    fn render_step(&self, page_num: u32, step: Step, output: &Path) -> Result<()> {
        self.renderer
            .render_pdf_page(&self.pdf, page_num, step.width, output)
    }

    fn extract_text(&self, _image: &Path, _lang: &str) -> Result<String> {
        Ok(self.metadata.to_string())
    }

    fn extract_layout(&self, image: &Path, _lang: &str) -> Result<String> {
        let (width, height) = papyrus_document::image::image_dimensions(image)?;
        hocr::empty_document(width, height)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Runs pages through render → text → hOCR with notifications.
pub struct PagePipeline {
    storage: Arc<dyn Storage>,
    renderer: Arc<dyn PageRenderer>,
    engine: Arc<dyn OcrEngine>,
    bus: Arc<NotificationBus>,
    steps: Steps,
}

impl PagePipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        renderer: Arc<dyn PageRenderer>,
        engine: Arc<dyn OcrEngine>,
        bus: Arc<NotificationBus>,
        steps: Steps,
    ) -> Self {
        Self {
            storage,
            renderer,
            engine,
            bus,
            steps,
        }
    }

    pub fn steps(&self) -> &Steps {
        &self.steps
    }

    /// Process one page.
    #[instrument(skip_all, fields(
        document_id = request.document_id,
        version = request.version,
        page = request.page_num,
    ))]
    pub fn ocr_page(&self, request: &OcrRequest) -> Result<PageOutcome> {
        let doc_path = request.document_path();
        let url = doc_path.url();
        if !self.storage.exists(&url) {
            info!(url = %url, "document not local, downloading");
            self.storage.download(&url, request.namespace.as_deref())?;
        }

        let upload = self.storage.abspath(&url);
        let format = SourceFormat::from_kind(classify_with_extension(&upload))?;
        debug!(?format, "source format selected");

        let (rendered_from, metadata) = match format {
            SourceFormat::Pdf | SourceFormat::Image => (doc_path.clone(), None),
            SourceFormat::TiffDerived => {
                let pdf_name = converted_sibling(&upload, |tiff| convert::tiff_to_pdf(tiff))?;
                (doc_path.with_file_name(pdf_name), None)
            }
            SourceFormat::DicomDerived => {
                let dataset = convert::dicom::open(&upload)?;
                let metadata = convert::dicom::to_metadata_map(&dataset);
                let target = convert::converted_path(&upload);
                if !target.is_file() {
                    convert::dicom::to_pdf(&dataset, &target)?;
                }
                let pdf_name = target
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PapyrusError::InvalidInput(format!("{} has no file name", target.display()))
                    })?;
                (doc_path.with_file_name(pdf_name), Some(metadata))
            }
        };

        let source_file = self.storage.abspath(&rendered_from.url());
        let source: Box<dyn PageSource + '_> = match (format, &metadata) {
            (SourceFormat::Image, _) => Box::new(ImageSource {
                path: source_file,
                engine: self.engine.as_ref(),
            }),
            (SourceFormat::DicomDerived, Some(metadata)) => Box::new(DicomSource {
                pdf: source_file,
                renderer: self.renderer.as_ref(),
                metadata: metadata.clone(),
            }),
            _ => Box::new(PdfSource {
                pdf: source_file,
                renderer: self.renderer.as_ref(),
                engine: self.engine.as_ref(),
            }),
        };

        let page_count = source.page_count()?;
        if request.page_num == 0 || request.page_num > page_count {
            return Err(PapyrusError::PageOutOfRange {
                page: request.page_num,
                page_count,
            });
        }

        let text_step = self.steps.text_step();
        let page = PagePath::new(rendered_from, request.page_num, text_step, page_count);
        self.run(source.as_ref(), &page, request)?;

        info!(?format, page_count, "page processed");
        Ok(PageOutcome {
            page_path: page,
            format,
            metadata,
        })
    }

    fn run(&self, source: &dyn PageSource, page: &PagePath, request: &OcrRequest) -> Result<()> {
        let storage = self.storage.as_ref();
        source.render_steps(page, &self.steps, storage)?;

        let text_step = page.step;
        notify::notify_pre_page_ocr(&self.bus, self.origin(request, text_step), &request.lang);

        let text_image = storage.abspath(&page.img_url());
        let text = source.extract_text(&text_image, &request.lang)?;
        storage.write_text(&page.txt_url(), &text)?;
        notify::notify_txt_ready(&self.bus, storage, page, self.origin(request, text_step));

        for step in self.steps.ocr_steps() {
            let at_step = page.at_step(*step);
            let image = storage.abspath(&at_step.img_url());
            let hocr = source.extract_layout(&image, &request.lang)?;
            storage.write_text(&at_step.hocr_url(), &hocr)?;
            notify::notify_hocr_ready(&self.bus, storage, &at_step, self.origin(request, *step));
        }
        Ok(())
    }

    fn origin(&self, request: &OcrRequest, step: Step) -> EventOrigin {
        EventOrigin {
            owner_id: request.owner_id,
            document_id: request.document_id,
            file_name: request.file_name.clone(),
            page_num: request.page_num,
            version: request.version,
            step: step.ordinal,
            namespace: request.namespace.clone(),
        }
    }
}

/// Convert `upload` once; later pages of the same version reuse the result.
fn converted_sibling(
    upload: &Path,
    conversion: impl FnOnce(&Path) -> Result<String>,
) -> Result<String> {
    let target = convert::converted_path(upload);
    if let Some(name) = target.file_name().and_then(|name| name.to_str()) {
        if target.is_file() {
            debug!(target = %target.display(), "reusing converted PDF");
            return Ok(name.to_string());
        }
    }
    conversion(upload)
}
