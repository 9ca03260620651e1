// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Papyrus — document ingestion worker.
//
// Entry point. Initialises logging, loads configuration, opens the version
// catalog and dispatches one subcommand. Page events are printed to stdout
// as JSON lines.

mod args;

use std::process::ExitCode;
use std::sync::{Arc, Mutex, MutexGuard};

use clap::Parser;
use papyrus_core::error::{PapyrusError, Result};
use papyrus_core::{FileKind, PipelineConfig, Steps};
use papyrus_document::{classify_with_extension, convert, page_count};
use papyrus_ocr::{
    NotificationBus, OcrEngine, OcrRequest, PageEditor, PageEvent, PagePipeline, PopplerRenderer,
    TesseractEngine,
};
use papyrus_store::{LocalStorage, Storage, VersionCatalog, integrity};
use tracing::{error, info};

use args::{Cli, Command, EngineKind};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, class = ?err.class(), "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Services shared by the commands that touch stored documents.
struct Worker {
    config: PipelineConfig,
    steps: Steps,
    storage: Arc<LocalStorage>,
    catalog: Arc<Mutex<VersionCatalog>>,
}

impl Worker {
    fn open(cli: &Cli) -> Result<Self> {
        let mut config = PipelineConfig::load(&cli.config)?;
        if let Some(media_root) = &cli.media_root {
            config.media_root = media_root.clone();
        }
        if let Some(catalog) = &cli.catalog {
            config.catalog_path = catalog.clone();
        }

        let steps = config.steps()?;
        let mut storage = LocalStorage::new(&config.media_root, steps.clone());
        if let Some(mirror_root) = &config.mirror_root {
            storage = storage.with_mirror(mirror_root);
        }
        let catalog = VersionCatalog::open(&config.catalog_path)?;

        info!(
            media_root = %config.media_root.display(),
            catalog = %config.catalog_path.display(),
            steps = steps.len(),
            "worker ready"
        );
        Ok(Self {
            config,
            steps,
            storage: Arc::new(storage),
            catalog: Arc::new(Mutex::new(catalog)),
        })
    }

    fn catalog(&self) -> MutexGuard<'_, VersionCatalog> {
        self.catalog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Classify { path } => {
            println!("{}", classify_with_extension(path).mime_type());
            Ok(())
        }
        Command::PageCount { path } => {
            println!("{}", page_count(path, classify_with_extension(path))?);
            Ok(())
        }
        Command::Convert { path } => {
            let converted = match classify_with_extension(path) {
                FileKind::Tiff => convert::tiff_to_pdf(path)?,
                FileKind::Dicom => convert::dicom::convert(path)?,
                other => {
                    return Err(PapyrusError::UnsupportedFormat(format!(
                        "nothing to convert for {}",
                        other.mime_type()
                    )));
                }
            };
            println!("{converted}");
            Ok(())
        }
        Command::Register { path, owner } => register(&Worker::open(&cli)?, path, *owner),
        Command::Ocr {
            document,
            page,
            version,
            lang,
            namespace,
            engine,
        } => {
            let worker = Worker::open(&cli)?;
            let catalog = worker.catalog();
            let version = match version {
                Some(number) => catalog.version(*document, *number)?,
                None => catalog.latest_version(*document)?,
            }
            .ok_or_else(|| {
                PapyrusError::InvalidInput(format!("document {} has no such version", document))
            })?;
            drop(catalog);

            let request = OcrRequest {
                owner_id: version.owner_id,
                document_id: version.document_id,
                file_name: version.file_name.clone(),
                page_num: *page,
                version: version.number,
                lang: lang.clone().unwrap_or_else(|| worker.config.default_lang.clone()),
                namespace: namespace.clone(),
            };
            ocr(&worker, &request, *engine)
        }
        Command::Delete { document, pages } => {
            let worker = Worker::open(&cli)?;
            let catalog = worker.catalog();
            let outcome = PageEditor::new(&catalog, worker.storage.as_ref(), worker.steps.clone())
                .delete_pages(*document, pages)?;
            print_outcome(&outcome)
        }
        Command::Reorder { document, pairs } => {
            let worker = Worker::open(&cli)?;
            let catalog = worker.catalog();
            let outcome = PageEditor::new(&catalog, worker.storage.as_ref(), worker.steps.clone())
                .reorder_pages(*document, pairs)?;
            print_outcome(&outcome)
        }
        Command::Rotate {
            document,
            rotations,
        } => {
            let worker = Worker::open(&cli)?;
            let catalog = worker.catalog();
            let outcome = PageEditor::new(&catalog, worker.storage.as_ref(), worker.steps.clone())
                .rotate_pages(*document, rotations)?;
            print_outcome(&outcome)
        }
    }
}

// -- Commands -----------------------------------------------------------------

fn register(worker: &Worker, path: &std::path::Path, owner: u64) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PapyrusError::InvalidInput(format!("bad file name: {}", path.display())))?;
    let pages = page_count(path, classify_with_extension(path))?;

    let catalog = worker.catalog();
    let version = catalog.register_document(owner, file_name, pages)?;
    let target = worker.storage.abspath(&version.document_path().url());
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(path, &target)?;
    let (size, sha256) = integrity::hash_file(&target)?;
    catalog.record_file(version.document_id, version.number, size, &sha256)?;

    info!(document_id = version.document_id, pages, %sha256, "document stored");
    println!("{}", version.document_id);
    Ok(())
}

fn ocr(worker: &Worker, request: &OcrRequest, engine: EngineKind) -> Result<()> {
    let bus = Arc::new(NotificationBus::new());
    bus.subscribe(|event: &PageEvent| match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => error!(%err, event = event.name(), "cannot serialise event"),
    });

    let pipeline = PagePipeline::new(
        worker.storage.clone(),
        Arc::new(PopplerRenderer::new(&worker.config.pdftoppm_bin)),
        ocr_engine(&worker.config, engine)?,
        bus,
        worker.steps.clone(),
    );
    let outcome = pipeline.ocr_page(request)?;

    if let Some(metadata) = &outcome.metadata {
        worker.catalog().set_page_metadata(
            request.document_id,
            request.version,
            request.page_num,
            &serde_json::to_value(metadata)?,
        )?;
    }
    info!(
        page = request.page_num,
        format = ?outcome.format,
        text = %outcome.page_path.txt_url(),
        "page done"
    );
    Ok(())
}

fn ocr_engine(config: &PipelineConfig, kind: EngineKind) -> Result<Arc<dyn OcrEngine>> {
    match kind {
        EngineKind::Tesseract => Ok(Arc::new(TesseractEngine::new(&config.tesseract_bin))),
        #[cfg(feature = "ocr")]
        EngineKind::Ocrs => Ok(Arc::new(papyrus_ocr::OcrsEngine::with_defaults()?)),
        #[cfg(not(feature = "ocr"))]
        EngineKind::Ocrs => Err(PapyrusError::InvalidInput(
            "this build has no ocrs engine; rebuild with --features ocr".into(),
        )),
    }
}

fn print_outcome(outcome: &papyrus_ocr::EditOutcome) -> Result<()> {
    let summary = serde_json::json!({
        "document_id": outcome.version.document_id,
        "version": outcome.version.number,
        "page_count": outcome.version.page_count,
        "copied": outcome.copied,
        "stale_pages": outcome.stale_pages,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
