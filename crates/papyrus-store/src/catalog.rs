// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Version catalog backed by SQLite.
//
// Records which documents exist, every version of each document, and the
// pages of every version (with their key/value metadata). File bytes and page
// artifacts are not stored here; they live in `Storage` under addresses
// derived from the catalog entries.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use papyrus_core::error::{PapyrusError, Result};
use papyrus_core::{DocumentVersion, Page};

/// SQLite schema.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS versions (
        document_id INTEGER NOT NULL REFERENCES documents(id),
        number INTEGER NOT NULL,
        file_name TEXT NOT NULL,
        page_count INTEGER NOT NULL,
        size INTEGER,
        sha256 TEXT,
        created_at TEXT NOT NULL,
        PRIMARY KEY (document_id, number)
    );
    CREATE TABLE IF NOT EXISTS pages (
        document_id INTEGER NOT NULL,
        version INTEGER NOT NULL,
        number INTEGER NOT NULL,
        metadata TEXT,
        PRIMARY KEY (document_id, version, number)
    );
"#;

const SELECT_VERSION_SQL: &str = "SELECT d.owner_id, v.document_id, v.number, v.file_name,
        v.page_count, v.size, v.sha256, v.created_at
     FROM versions v JOIN documents d ON d.id = v.document_id";

/// Catalog of documents, versions and pages.
///
/// All methods are synchronous. The connection is `Send` but not `Sync`;
/// share a catalog between threads behind a `Mutex`.
pub struct VersionCatalog {
    conn: Connection,
}

impl VersionCatalog {
    /// Open (or create) the catalog database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| PapyrusError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| PapyrusError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| PapyrusError::Database(format!("create tables: {e}")))?;

        info!("version catalog opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PapyrusError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| PapyrusError::Database(format!("create tables: {e}")))?;

        debug!("in-memory version catalog opened");
        Ok(Self { conn })
    }

    /// Create a document together with its first version.
    #[instrument(skip(self))]
    pub fn register_document(
        &self,
        owner_id: u64,
        file_name: &str,
        page_count: u32,
    ) -> Result<DocumentVersion> {
        if page_count == 0 {
            return Err(PapyrusError::InvalidInput(
                "a document needs at least one page".into(),
            ));
        }

        let now = Utc::now();
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| PapyrusError::Database(format!("begin: {e}")))?;

        tx.execute(
            "INSERT INTO documents (owner_id, created_at) VALUES (?1, ?2)",
            params![owner_id as i64, now.to_rfc3339()],
        )
        .map_err(|e| PapyrusError::Database(format!("insert document: {e}")))?;
        let document_id = tx.last_insert_rowid() as u64;

        insert_version(&tx, document_id, 1, file_name, page_count, &now)?;
        tx.commit()
            .map_err(|e| PapyrusError::Database(format!("commit: {e}")))?;

        info!(document_id, "document registered");
        self.version(document_id, 1)?.ok_or_else(|| {
            PapyrusError::Database(format!("document {document_id} vanished after insert"))
        })
    }

    /// The highest-numbered version of a document.
    pub fn latest_version(&self, document_id: u64) -> Result<Option<DocumentVersion>> {
        let number: Option<u32> = self
            .conn
            .query_row(
                "SELECT MAX(number) FROM versions WHERE document_id = ?1",
                params![document_id as i64],
                |row| row.get(0),
            )
            .map_err(|e| PapyrusError::Database(format!("latest version: {e}")))?;

        match number {
            Some(number) => self.version(document_id, number),
            None => Ok(None),
        }
    }

    /// A specific version, with its pages.
    pub fn version(&self, document_id: u64, number: u32) -> Result<Option<DocumentVersion>> {
        let sql = format!("{SELECT_VERSION_SQL} WHERE v.document_id = ?1 AND v.number = ?2");
        let version = self
            .conn
            .query_row(&sql, params![document_id as i64, number], row_to_version)
            .optional()
            .map_err(|e| PapyrusError::Database(format!("get version: {e}")))?;

        match version {
            Some(mut version) => {
                version.pages = self.pages(document_id, number)?;
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    /// Allocate the next version of a document.
    ///
    /// The file name is carried over from the latest version. `page_count`
    /// defaults to the latest version's count. This is the only place a page
    /// count changes.
    #[instrument(skip(self))]
    pub fn version_bump(&self, document_id: u64, page_count: Option<u32>) -> Result<DocumentVersion> {
        let latest = self.latest_version(document_id)?.ok_or_else(|| {
            PapyrusError::InvalidInput(format!("document {document_id} does not exist"))
        })?;
        let page_count = page_count.unwrap_or(latest.page_count);
        if page_count == 0 {
            return Err(PapyrusError::InvalidInput(
                "a version needs at least one page".into(),
            ));
        }

        let number = latest.number + 1;
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| PapyrusError::Database(format!("begin: {e}")))?;
        insert_version(&tx, document_id, number, &latest.file_name, page_count, &Utc::now())?;
        tx.commit()
            .map_err(|e| PapyrusError::Database(format!("commit: {e}")))?;

        info!(document_id, number, page_count, "version bumped");
        self.version(document_id, number)?.ok_or_else(|| {
            PapyrusError::Database(format!("version {number} vanished after insert"))
        })
    }

    /// Pages of a version, in page order.
    pub fn pages(&self, document_id: u64, version: u32) -> Result<Vec<Page>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT number, metadata FROM pages
                 WHERE document_id = ?1 AND version = ?2 ORDER BY number ASC",
            )
            .map_err(|e| PapyrusError::Database(format!("prepare pages: {e}")))?;

        let rows = stmt
            .query_map(params![document_id as i64, version], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(|e| PapyrusError::Database(format!("query pages: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PapyrusError::Database(format!("collect pages: {e}")))?;

        rows.into_iter()
            .map(|(number, metadata)| -> Result<Page> {
                let metadata = metadata
                    .map(|text| serde_json::from_str(&text))
                    .transpose()?;
                Ok(Page { number, metadata })
            })
            .collect()
    }

    /// Attach key/value metadata to a page, replacing what was there.
    #[instrument(skip(self, metadata))]
    pub fn set_page_metadata(
        &self,
        document_id: u64,
        version: u32,
        page: u32,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        let rows = self
            .conn
            .execute(
                "UPDATE pages SET metadata = ?1
                 WHERE document_id = ?2 AND version = ?3 AND number = ?4",
                params![json, document_id as i64, version, page],
            )
            .map_err(|e| PapyrusError::Database(format!("update page metadata: {e}")))?;

        if rows == 0 {
            return Err(PapyrusError::InvalidInput(format!(
                "page {page} of document {document_id} v{version} not found"
            )));
        }
        debug!("page metadata stored");
        Ok(())
    }

    /// Metadata of a page, if any was set.
    pub fn page_metadata(
        &self,
        document_id: u64,
        version: u32,
        page: u32,
    ) -> Result<Option<serde_json::Value>> {
        let json: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT metadata FROM pages
                 WHERE document_id = ?1 AND version = ?2 AND number = ?3",
                params![document_id as i64, version, page],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| PapyrusError::Database(format!("get page metadata: {e}")))?;

        Ok(json
            .flatten()
            .map(|text| serde_json::from_str(&text))
            .transpose()?)
    }

    /// Record the backing file's size and SHA-256 for a version.
    #[instrument(skip(self))]
    pub fn record_file(&self, document_id: u64, version: u32, size: u64, sha256: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE versions SET size = ?1, sha256 = ?2 WHERE document_id = ?3 AND number = ?4",
                params![size as i64, sha256, document_id as i64, version],
            )
            .map_err(|e| PapyrusError::Database(format!("record file: {e}")))?;

        if rows == 0 {
            return Err(PapyrusError::InvalidInput(format!(
                "document {document_id} v{version} not found"
            )));
        }
        Ok(())
    }

    /// Remove a version and its pages. Used to undo a bump whose files could
    /// not be written; only the latest version may be discarded.
    #[instrument(skip(self))]
    pub fn discard_version(&self, document_id: u64, version: u32) -> Result<()> {
        let latest = self.latest_version(document_id)?.map(|v| v.number);
        if latest != Some(version) || version == 1 {
            return Err(PapyrusError::InvalidInput(format!(
                "document {document_id} v{version} is not a discardable version"
            )));
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| PapyrusError::Database(format!("begin: {e}")))?;
        tx.execute(
            "DELETE FROM pages WHERE document_id = ?1 AND version = ?2",
            params![document_id as i64, version],
        )
        .map_err(|e| PapyrusError::Database(format!("delete pages: {e}")))?;
        tx.execute(
            "DELETE FROM versions WHERE document_id = ?1 AND number = ?2",
            params![document_id as i64, version],
        )
        .map_err(|e| PapyrusError::Database(format!("delete version: {e}")))?;
        tx.commit()
            .map_err(|e| PapyrusError::Database(format!("commit: {e}")))?;

        info!(document_id, version, "version discarded");
        Ok(())
    }
}

fn insert_version(
    conn: &Connection,
    document_id: u64,
    number: u32,
    file_name: &str,
    page_count: u32,
    created_at: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO versions (document_id, number, file_name, page_count, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![document_id as i64, number, file_name, page_count, created_at.to_rfc3339()],
    )
    .map_err(|e| PapyrusError::Database(format!("insert version: {e}")))?;

    let mut stmt = conn
        .prepare("INSERT INTO pages (document_id, version, number) VALUES (?1, ?2, ?3)")
        .map_err(|e| PapyrusError::Database(format!("prepare insert page: {e}")))?;
    for page in 1..=page_count {
        stmt.execute(params![document_id as i64, number, page])
            .map_err(|e| PapyrusError::Database(format!("insert page: {e}")))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a row of `SELECT_VERSION_SQL` to a `DocumentVersion` without pages.
fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentVersion> {
    let created_at_str: String = row.get(7)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(DocumentVersion {
        owner_id: row.get::<_, i64>(0)? as u64,
        document_id: row.get::<_, i64>(1)? as u64,
        number: row.get(2)?,
        file_name: row.get(3)?,
        page_count: row.get(4)?,
        pages: Vec::new(),
        size: row.get::<_, Option<i64>>(5)?.map(|size| size as u64),
        sha256: row.get(6)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> VersionCatalog {
        VersionCatalog::open_in_memory().expect("open in-memory db")
    }

    #[test]
    fn register_creates_version_one() {
        let catalog = catalog();
        let version = catalog.register_document(7, "scan.pdf", 3).expect("register");
        assert_eq!(version.number, 1);
        assert_eq!(version.owner_id, 7);
        assert_eq!(version.page_count, 3);
        let numbers: Vec<u32> = version.pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn version_bump_increments_and_carries_file_name() {
        let catalog = catalog();
        let v1 = catalog.register_document(1, "scan.pdf", 3).expect("register");
        let v2 = catalog.version_bump(v1.document_id, Some(2)).expect("bump");
        let v3 = catalog.version_bump(v1.document_id, None).expect("bump again");

        assert_eq!((v2.number, v2.page_count), (2, 2));
        assert_eq!((v3.number, v3.page_count), (3, 2));
        assert_eq!(v3.file_name, "scan.pdf");
        assert_eq!(
            catalog.latest_version(v1.document_id).expect("latest").map(|v| v.number),
            Some(3)
        );
        // Old versions stay untouched.
        let old = catalog.version(v1.document_id, 1).expect("get").expect("found");
        assert_eq!(old.page_count, 3);
    }

    #[test]
    fn bump_of_unknown_document_fails() {
        let result = catalog().version_bump(99, None);
        assert!(matches!(result, Err(PapyrusError::InvalidInput(_))));
    }

    #[test]
    fn page_metadata_round_trip() {
        let catalog = catalog();
        let v1 = catalog.register_document(1, "ct.dcm", 1).expect("register");
        assert_eq!(catalog.page_metadata(v1.document_id, 1, 1).expect("get"), None);

        let meta = json!({"PatientName": "Doe^Jane"});
        catalog
            .set_page_metadata(v1.document_id, 1, 1, &meta)
            .expect("set");
        assert_eq!(
            catalog.page_metadata(v1.document_id, 1, 1).expect("get"),
            Some(meta.clone())
        );
        let pages = catalog.pages(v1.document_id, 1).expect("pages");
        assert_eq!(pages[0].metadata, Some(meta));
    }

    #[test]
    fn metadata_for_missing_page_fails() {
        let catalog = catalog();
        let v1 = catalog.register_document(1, "ct.dcm", 1).expect("register");
        let result = catalog.set_page_metadata(v1.document_id, 1, 2, &json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn record_file_is_visible_on_version() {
        let catalog = catalog();
        let v1 = catalog.register_document(1, "scan.pdf", 1).expect("register");
        catalog
            .record_file(v1.document_id, 1, 1234, "abcd")
            .expect("record");
        let v1 = catalog.version(v1.document_id, 1).expect("get").expect("found");
        assert_eq!(v1.size, Some(1234));
        assert_eq!(v1.sha256.as_deref(), Some("abcd"));
    }

    #[test]
    fn discarded_version_frees_its_number() {
        let catalog = catalog();
        let v1 = catalog.register_document(1, "scan.pdf", 2).expect("register");
        let v2 = catalog.version_bump(v1.document_id, Some(1)).expect("bump");

        catalog.discard_version(v1.document_id, v2.number).expect("discard");
        assert!(catalog.version(v1.document_id, 2).expect("get").is_none());
        assert!(catalog.pages(v1.document_id, 2).expect("pages").is_empty());

        let again = catalog.version_bump(v1.document_id, None).expect("bump again");
        assert_eq!((again.number, again.page_count), (2, 2));
    }

    #[test]
    fn only_the_latest_later_version_can_be_discarded() {
        let catalog = catalog();
        let v1 = catalog.register_document(1, "scan.pdf", 2).expect("register");
        assert!(catalog.discard_version(v1.document_id, 1).is_err());
        catalog.version_bump(v1.document_id, None).expect("bump");
        catalog.version_bump(v1.document_id, None).expect("bump");
        assert!(catalog.discard_version(v1.document_id, 2).is_err());
        assert!(catalog.version(v1.document_id, 2).expect("get").is_some());
    }

    #[test]
    fn on_disk_catalog_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.db");
        let document_id = {
            let catalog = VersionCatalog::open(&path).expect("open");
            catalog.register_document(1, "a.pdf", 2).expect("register").document_id
        };
        let catalog = VersionCatalog::open(&path).expect("reopen");
        assert!(catalog.version(document_id, 1).expect("get").is_some());
    }
}
