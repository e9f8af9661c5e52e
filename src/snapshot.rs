use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("catalog database not found: {0}")]
    Missing(PathBuf),
    #[error("snapshot copy failed: {0}")]
    Copy(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A private, read-only copy of the catalog database. The live catalog is
/// under constant write contention from the media server, so every cycle
/// works off a copied file instead.
#[derive(Debug)]
pub struct CatalogSnapshot {
    conn: Connection,
    snapshot_path: PathBuf,
}

impl CatalogSnapshot {
    /// Copy the catalog (and its WAL, if present) into the temp dir and open
    /// the copy read-only.
    pub fn take(db_path: &Path) -> Result<Self, SnapshotError> {
        if !db_path.exists() {
            return Err(SnapshotError::Missing(db_path.to_path_buf()));
        }

        let snapshot_path = std::env::temp_dir().join("anchorbeat_snapshot.db");
        let wal_path = snapshot_path.with_extension("db-wal");
        std::fs::remove_file(&snapshot_path).ok();
        std::fs::remove_file(&wal_path).ok();

        std::fs::copy(db_path, &snapshot_path)?;
        let src_wal = PathBuf::from(format!("{}-wal", db_path.display()));
        if src_wal.exists() {
            std::fs::copy(&src_wal, format!("{}-wal", snapshot_path.display()))?;
        }

        let conn = Connection::open_with_flags(
            &snapshot_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self { conn, snapshot_path })
    }

    /// List every catalog path. Rows are returned as stored (server-relative
    /// paths); see [`map_catalog_path`] for the filesystem mapping.
    pub fn track_paths(&self) -> Result<Vec<String>, SnapshotError> {
        let mut stmt = self.conn.prepare("SELECT path FROM media_file")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }
}

impl Drop for CatalogSnapshot {
    fn drop(&mut self) {
        std::fs::remove_file(&self.snapshot_path).ok();
        std::fs::remove_file(format!("{}-wal", self.snapshot_path.display())).ok();
    }
}

/// Map a catalog path to a filesystem path: strip a leading `/music/` or a
/// single leading `/`, then join to the configured music root.
pub fn map_catalog_path(catalog_path: &str, music_dir: &Path) -> PathBuf {
    let rel = catalog_path
        .strip_prefix("/music/")
        .or_else(|| catalog_path.strip_prefix('/'))
        .unwrap_or(catalog_path);
    music_dir.join(rel)
}
