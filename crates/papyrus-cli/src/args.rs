// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface and value parsers.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use papyrus_core::config::CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "papyrus")]
#[command(about = "Document ingestion worker: classify, count, OCR and edit pages")]
pub struct Cli {
    /// Configuration file (JSON). Missing file means defaults.
    #[arg(short, long, default_value = CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Override the media root from the configuration.
    #[arg(long, global = true)]
    pub media_root: Option<PathBuf>,

    /// Override the catalog database path from the configuration.
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the detected format of a file.
    Classify { path: PathBuf },

    /// Print the number of pages of a file.
    PageCount { path: PathBuf },

    /// Convert a TIFF or DICOM file to a sibling PDF.
    Convert { path: PathBuf },

    /// Store a file as version 1 of a new document.
    Register {
        path: PathBuf,
        #[arg(long)]
        owner: u64,
    },

    /// Render, OCR and announce one page of a document version.
    Ocr {
        #[arg(long)]
        document: u64,
        #[arg(long)]
        page: u32,
        /// Defaults to the latest version.
        #[arg(long)]
        version: Option<u32>,
        /// Defaults to the configured language.
        #[arg(long)]
        lang: Option<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long, value_enum, default_value_t = EngineKind::Tesseract)]
        engine: EngineKind,
    },

    /// Delete pages, e.g. `--pages 2,5`.
    Delete {
        #[arg(long)]
        document: u64,
        #[arg(long, value_parser = parse_page_set)]
        pages: BTreeSet<u32>,
    },

    /// Reorder pages with `old:new` pairs, e.g. `--pairs 3:1,1:2,2:3`.
    Reorder {
        #[arg(long)]
        document: u64,
        #[arg(long, value_parser = parse_pairs)]
        pairs: Pairs,
    },

    /// Rotate pages with `page:degrees` pairs, e.g. `--rotations 2:90`.
    Rotate {
        #[arg(long)]
        document: u64,
        #[arg(long, value_parser = parse_rotations)]
        rotations: Rotations,
    },
}

/// Which OCR engine extracts text and layout.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// The tesseract executable.
    Tesseract,
    /// In-process ocrs models (needs the `ocr` feature).
    Ocrs,
}

pub type Pairs = Vec<(u32, u32)>;
pub type Rotations = Vec<(u32, i32)>;

pub fn parse_page_set(value: &str) -> Result<BTreeSet<u32>, String> {
    value
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u32>()
                .map_err(|err| format!("bad page number {:?}: {}", part, err))
        })
        .collect()
}

pub fn parse_pairs(value: &str) -> Result<Pairs, String> {
    split_pairs(value)?
        .into_iter()
        .map(|(left, right)| Ok((number(left)?, number(right)?)))
        .collect()
}

pub fn parse_rotations(value: &str) -> Result<Rotations, String> {
    split_pairs(value)?
        .into_iter()
        .map(|(page, degrees)| {
            let degrees = degrees
                .parse::<i32>()
                .map_err(|err| format!("bad angle {:?}: {}", degrees, err))?;
            Ok((number(page)?, degrees))
        })
        .collect()
}

fn split_pairs(value: &str) -> Result<Vec<(&str, &str)>, String> {
    value
        .split(',')
        .map(|pair| {
            pair.trim()
                .split_once(':')
                .ok_or_else(|| format!("expected a:b, got {:?}", pair))
        })
        .collect()
}

fn number(value: &str) -> Result<u32, String> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("bad page number {:?}: {}", value, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn page_lists() {
        assert_eq!(parse_page_set("2, 5,2").expect("ok"), BTreeSet::from([2, 5]));
        assert!(parse_page_set("two").is_err());
    }

    #[test]
    fn pair_lists() {
        assert_eq!(
            parse_pairs("3:1,1:2,2:3").expect("ok"),
            vec![(3, 1), (1, 2), (2, 3)]
        );
        assert!(parse_pairs("3-1").is_err());
        assert_eq!(parse_rotations("2:-90").expect("ok"), vec![(2, -90)]);
    }

    #[test]
    fn subcommand_parsing() {
        let cli = Cli::try_parse_from(["papyrus", "delete", "--document", "7", "--pages", "1,3"])
            .expect("parse");
        match cli.command {
            Command::Delete { document, pages } => {
                assert_eq!(document, 7);
                assert_eq!(pages, BTreeSet::from([1, 3]));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
