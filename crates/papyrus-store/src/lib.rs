// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// papyrus-store — Where documents and their page artifacts live.
//
// - `storage`: the `Storage` collaborator (local media root, optional mirror)
// - `catalog`: SQLite-backed catalog of documents, versions and pages
// - `integrity`: SHA-256 fingerprints of backing files

pub mod catalog;
pub mod integrity;
pub mod storage;

pub use catalog::VersionCatalog;
pub use storage::{LocalStorage, Storage};
