use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::error::{MigrateError, Result};
use crate::migrate::labels::LabelMigration;
use crate::migrate::milestones::MilestoneMigration;
use crate::migrate::run_migration;
use crate::output::{Format, print_report};
use crate::report::Report;
use crate::store::db::Db;
use crate::store::lock::RunLock;
use crate::templates::TemplateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Labels,
    Milestones,
}

/// Open the database under the run lock, apply one migration, release both.
pub fn execute(db_path: &Path, target: Target, templates: Option<&Path>) -> Result<Report> {
    let config = TemplateConfig::load(templates)?;
    if !db_path.exists() {
        return Err(MigrateError::DatabaseNotFound(
            db_path.display().to_string(),
        ));
    }

    let lock = RunLock::acquire(db_path)?;
    let db = Db::open(db_path)?;
    info!(db = %db_path.display(), "opened database");

    let now = Utc::now();
    let report = match target {
        Target::Labels => {
            run_migration(&db, &LabelMigration::new(config.labels), now)?
        }
        Target::Milestones => {
            run_migration(&db, &MilestoneMigration::new(config.milestones), now)?
        }
    };

    drop(db);
    lock.release()?;
    Ok(report)
}

pub fn run(db_path: &Path, target: Target, templates: Option<&Path>, format: Format) -> Result<()> {
    let report = execute(db_path, target, templates)?;
    print_report(&report, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_database_is_fatal() {
        let dir = tempdir().unwrap();
        let err = execute(&dir.path().join("nope.db"), Target::Labels, None).unwrap_err();
        assert!(matches!(err, MigrateError::DatabaseNotFound(_)));
    }

    #[test]
    fn held_lock_blocks_a_second_run() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("board.db");
        Db::open(&db_path).unwrap();

        let _held = RunLock::acquire(&db_path).unwrap();
        let err = execute(&db_path, Target::Milestones, None).unwrap_err();
        assert_eq!(err.code(), "locked");
    }

    #[test]
    fn lock_is_released_after_a_run() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("board.db");
        let db = Db::open(&db_path).unwrap();
        db.insert_team("Core").unwrap();
        drop(db);

        let report = execute(&db_path, Target::Labels, None).unwrap();
        assert_eq!(report.totals.created, 11);
        assert!(RunLock::acquire(&db_path).is_ok());
    }

    #[test]
    fn bad_template_file_fails_before_touching_the_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("board.db");
        Db::open(&db_path).unwrap();
        let templates = dir.path().join("templates.yaml");
        std::fs::write(&templates, "labels: []\n").unwrap();

        let err = execute(&db_path, Target::Labels, Some(&templates)).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert!(!crate::store::lock::lock_path_for(&db_path).exists());
    }
}
