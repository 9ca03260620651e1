// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Worker configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{StepSpec, Steps};

/// Default configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "papyrus.json";

/// Persistent worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root under which documents and page artifacts are addressed.
    pub media_root: PathBuf,
    /// Shared location documents are fetched from when missing locally
    /// (distributed deployments). `None` means local-only.
    pub mirror_root: Option<PathBuf>,
    /// SQLite catalog of document versions.
    pub catalog_path: PathBuf,
    /// OCR language used when a request does not name one.
    pub default_lang: String,
    /// Rendering tiers, in any order; sorted by width on load.
    pub steps: Vec<StepSpec>,
    /// Tesseract executable.
    pub tesseract_bin: String,
    /// Poppler `pdftoppm` executable.
    pub pdftoppm_bin: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            mirror_root: None,
            catalog_path: PathBuf::from("papyrus.db"),
            default_lang: "eng".into(),
            steps: Steps::default()
                .iter()
                .map(|step| StepSpec {
                    width: step.width,
                    thumbnail: step.thumbnail,
                })
                .collect(),
            tesseract_bin: "tesseract".into(),
            pdftoppm_bin: "pdftoppm".into(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. A missing file yields the defaults; a malformed
    /// one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Validated, ordered step list.
    pub fn steps(&self) -> Result<Steps> {
        Steps::new(&self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_steps_are_valid() {
        let steps = PipelineConfig::default().steps().expect("valid");
        assert_eq!(steps, Steps::default());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::load(dir.path().join(CONFIG_FILE)).expect("load");
        assert_eq!(config.default_lang, "eng");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);

        let mut config = PipelineConfig::default();
        config.default_lang = "deu".into();
        config.mirror_root = Some(PathBuf::from("/srv/shared"));
        config.save(&path).expect("save");

        let loaded = PipelineConfig::load(&path).expect("load");
        assert_eq!(loaded.default_lang, "deu");
        assert_eq!(loaded.mirror_root, Some(PathBuf::from("/srv/shared")));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "default_lang": "fra" }"#).expect("write");

        let loaded = PipelineConfig::load(&path).expect("load");
        assert_eq!(loaded.default_lang, "fra");
        assert_eq!(loaded.tesseract_bin, "tesseract");
    }
}
