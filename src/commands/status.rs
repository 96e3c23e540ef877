use std::path::Path;

use crate::error::{MigrateError, Result};
use crate::model::MigrationRun;
use crate::output::{Format, print_runs};
use crate::store::db::Db;

/// Ledger rows of an existing database, read without touching its schema.
pub fn runs(db_path: &Path) -> Result<Vec<MigrationRun>> {
    if !db_path.exists() {
        return Err(MigrateError::DatabaseNotFound(
            db_path.display().to_string(),
        ));
    }
    let db = Db::open_read_only(db_path)?;
    db.list_migration_runs()
}

pub fn run(db_path: &Path, format: Format) -> Result<()> {
    let recorded = runs(db_path)?;
    print_runs(&recorded, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rusqlite::Connection;
    use tempfile::tempdir;

    #[test]
    fn status_leaves_an_unmigrated_database_untouched() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("board.db");
        Connection::open(&db_path)
            .unwrap()
            .execute_batch("CREATE TABLE teams (id TEXT PRIMARY KEY, name TEXT NOT NULL);")
            .unwrap();

        assert!(runs(&db_path).unwrap().is_empty());

        let conn = Connection::open(&db_path).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "delete");
        let tables: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn status_lists_recorded_runs() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("board.db");
        {
            let db = Db::open(&db_path).unwrap();
            db.record_migration_run(&MigrationRun {
                name: "milestones".into(),
                applied_at: Utc::now(),
                created: 4,
                reused: 0,
                failed: 0,
                skipped_parents: 1,
                failed_parents: 0,
            })
            .unwrap();
        }

        let recorded = runs(&db_path).unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].name, "milestones");
        assert_eq!(recorded[0].skipped_parents, 1);
    }

    #[test]
    fn status_requires_an_existing_database() {
        let dir = tempdir().unwrap();
        let err = runs(&dir.path().join("absent.db")).unwrap_err();
        assert_eq!(err.code(), "database_not_found");
    }
}
