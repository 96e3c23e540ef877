use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, ffi, params};
use uuid::Uuid;

use crate::error::{MigrateError, Result};
use crate::model::{Card, Label, Milestone, MilestoneStatus, MigrationRun, Project, Team};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_dt_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|v| parse_dt(&v))
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Map a constraint failure on insert to `UniqueViolation`; pass anything else through.
fn unique_or_db(err: rusqlite::Error, entity: &'static str, key: &str) -> MigrateError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err
        && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
            || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    {
        return MigrateError::UniqueViolation {
            entity,
            key: key.to_string(),
        };
    }
    err.into()
}

fn row_to_team(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        legacy_milestones: row.get(3)?,
    })
}

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        legacy_labels: row.get(3)?,
    })
}

fn row_to_label(row: &Row<'_>) -> rusqlite::Result<Label> {
    let created_at: String = row.get(4)?;
    Ok(Label {
        id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: parse_dt(&created_at),
    })
}

fn row_to_milestone(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    let target_date: Option<String> = row.get(5)?;
    let status: String = row.get(6)?;
    let status: MilestoneStatus = status.parse().map_err(|err: String| {
        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, err.into())
    })?;
    let created_at: String = row.get(8)?;
    Ok(Milestone {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        notes: row.get(4)?,
        target_date: parse_dt_opt(target_date),
        status,
        order: row.get(7)?,
        created_at: parse_dt(&created_at),
    })
}

const LABEL_COLUMNS: &str = "id, team_id, name, color, created_at";
const MILESTONE_COLUMNS: &str =
    "id, project_id, title, description, notes, target_date, status, sort_order, created_at";

/// Fields for a milestone insert.
#[derive(Debug, Clone)]
pub struct NewMilestone<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub target_date: Option<DateTime<Utc>>,
    pub status: MilestoneStatus,
    pub order: u32,
}

// ---------------------------------------------------------------------------
// Db
// ---------------------------------------------------------------------------

/// Handle to the application database. Dropping it closes the connection.
pub struct Db {
    conn: Connection,
}

impl Db {
    /// Open (or create) the database at the given file path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Open an existing database for reading. Creates no tables and leaves the
    /// journal mode alone.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA busy_timeout=5000;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS teams (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                legacy_milestones TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_projects_team ON projects(team_id);

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                legacy_labels TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_cards_project ON cards(project_id);

            CREATE TABLE IF NOT EXISTS labels (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (team_id, name)
            );

            CREATE TABLE IF NOT EXISTS card_labels (
                card_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                label_id TEXT NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
                PRIMARY KEY (card_id, label_id)
            );

            CREATE TABLE IF NOT EXISTS milestones (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT,
                notes TEXT,
                target_date TEXT,
                status TEXT NOT NULL DEFAULT 'incomplete',
                sort_order INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (project_id, title)
            );

            CREATE TABLE IF NOT EXISTS migration_runs (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL,
                created INTEGER NOT NULL,
                reused INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                skipped_parents INTEGER NOT NULL,
                failed_parents INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        Ok(())
    }

    /// Expose the raw connection (for tests or advanced usage).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Parents
    // -----------------------------------------------------------------------

    pub fn insert_team(&self, name: &str) -> Result<Team> {
        let team = Team {
            id: new_id(),
            name: name.to_string(),
        };
        self.conn.execute(
            "INSERT INTO teams (id, name) VALUES (?1, ?2)",
            params![team.id, team.name],
        )?;
        Ok(team)
    }

    pub fn insert_project(
        &self,
        team_id: &str,
        name: &str,
        legacy_milestones: Option<&str>,
    ) -> Result<Project> {
        let project = Project {
            id: new_id(),
            team_id: team_id.to_string(),
            name: name.to_string(),
            legacy_milestones: legacy_milestones.map(str::to_string),
        };
        self.conn.execute(
            "INSERT INTO projects (id, team_id, name, legacy_milestones) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.id,
                project.team_id,
                project.name,
                project.legacy_milestones
            ],
        )?;
        Ok(project)
    }

    /// All teams in insertion order.
    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM teams ORDER BY rowid")?;
        let rows = stmt
            .query_map([], row_to_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All projects in insertion order.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, team_id, name, legacy_milestones FROM projects ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Cards
    // -----------------------------------------------------------------------

    pub fn insert_card(
        &self,
        project_id: &str,
        title: &str,
        legacy_labels: &[&str],
    ) -> Result<Card> {
        let card = Card {
            id: new_id(),
            project_id: project_id.to_string(),
            title: title.to_string(),
            legacy_labels: serde_json::to_string(legacy_labels)?,
        };
        self.conn.execute(
            "INSERT INTO cards (id, project_id, title, legacy_labels) VALUES (?1, ?2, ?3, ?4)",
            params![card.id, card.project_id, card.title, card.legacy_labels],
        )?;
        Ok(card)
    }

    /// Cards in every project owned by the team.
    pub fn cards_for_team(&self, team_id: &str) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.project_id, c.title, c.legacy_labels
             FROM cards c
             JOIN projects p ON p.id = c.project_id
             WHERE p.team_id = ?1
             ORDER BY c.rowid",
        )?;
        let rows = stmt
            .query_map(params![team_id], row_to_card)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Link a card to a label. Returns false when the link already existed.
    pub fn link_card_label(&self, card_id: &str, label_id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO card_labels (card_id, label_id) VALUES (?1, ?2)",
            params![card_id, label_id],
        )?;
        Ok(changed > 0)
    }

    pub fn card_label_ids(&self, card_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label_id FROM card_labels WHERE card_id = ?1 ORDER BY label_id")?;
        let rows = stmt
            .query_map(params![card_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn any_card_label(&self) -> Result<bool> {
        Ok(self
            .conn
            .query_row("SELECT EXISTS(SELECT 1 FROM card_labels)", [], |row| {
                row.get(0)
            })?)
    }

    // -----------------------------------------------------------------------
    // Labels
    // -----------------------------------------------------------------------

    pub fn count_labels(&self, team_id: &str) -> Result<u64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM labels WHERE team_id = ?1",
            params![team_id],
            |row| row.get(0),
        )?)
    }

    pub fn find_label(&self, team_id: &str, name: &str) -> Result<Option<Label>> {
        let sql = format!("SELECT {LABEL_COLUMNS} FROM labels WHERE team_id = ?1 AND name = ?2");
        Ok(self
            .conn
            .query_row(&sql, params![team_id, name], row_to_label)
            .optional()?)
    }

    pub fn labels_for_team(&self, team_id: &str) -> Result<Vec<Label>> {
        let sql = format!("SELECT {LABEL_COLUMNS} FROM labels WHERE team_id = ?1 ORDER BY rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![team_id], row_to_label)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert a label. A second label with the same name in the team fails with `UniqueViolation`.
    pub fn create_label(&self, team_id: &str, name: &str, color: &str) -> Result<Label> {
        let label = Label {
            id: new_id(),
            team_id: team_id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO labels (id, team_id, name, color, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    label.id,
                    label.team_id,
                    label.name,
                    label.color,
                    label.created_at.to_rfc3339()
                ],
            )
            .map_err(|err| unique_or_db(err, "label", name))?;
        Ok(label)
    }

    // -----------------------------------------------------------------------
    // Milestones
    // -----------------------------------------------------------------------

    pub fn count_milestones(&self, project_id: &str) -> Result<u64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM milestones WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?)
    }

    pub fn any_project_with_milestone(&self) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM milestones m JOIN projects p ON p.id = m.project_id
            )",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn find_milestone(&self, project_id: &str, title: &str) -> Result<Option<Milestone>> {
        let sql = format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE project_id = ?1 AND title = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![project_id, title], row_to_milestone)
            .optional()?)
    }

    pub fn milestones_for_project(&self, project_id: &str) -> Result<Vec<Milestone>> {
        let sql = format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE project_id = ?1 ORDER BY sort_order, rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![project_id], row_to_milestone)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert a milestone. A duplicate title in the project fails with `UniqueViolation`.
    pub fn create_milestone(&self, project_id: &str, new: &NewMilestone<'_>) -> Result<Milestone> {
        let milestone = Milestone {
            id: new_id(),
            project_id: project_id.to_string(),
            title: new.title.to_string(),
            description: new.description.map(str::to_string),
            notes: new.notes.map(str::to_string),
            target_date: new.target_date,
            status: new.status,
            order: new.order,
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO milestones (id, project_id, title, description, notes, target_date, status, sort_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    milestone.id,
                    milestone.project_id,
                    milestone.title,
                    milestone.description,
                    milestone.notes,
                    milestone.target_date.map(|d| d.to_rfc3339()),
                    milestone.status.to_string(),
                    milestone.order,
                    milestone.created_at.to_rfc3339(),
                ],
            )
            .map_err(|err| unique_or_db(err, "milestone", new.title))?;
        Ok(milestone)
    }

    // -----------------------------------------------------------------------
    // Migration ledger
    // -----------------------------------------------------------------------

    pub fn migration_run(&self, name: &str) -> Result<Option<MigrationRun>> {
        Ok(self
            .conn
            .query_row(
                "SELECT name, applied_at, created, reused, failed, skipped_parents, failed_parents
                 FROM migration_runs WHERE name = ?1",
                params![name],
                row_to_migration_run,
            )
            .optional()?)
    }

    /// Recorded runs; empty when no migration has ever written the ledger.
    pub fn list_migration_runs(&self) -> Result<Vec<MigrationRun>> {
        if !self.has_table("migration_runs")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT name, applied_at, created, reused, failed, skipped_parents, failed_parents
             FROM migration_runs ORDER BY applied_at, name",
        )?;
        let rows = stmt
            .query_map([], row_to_migration_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn record_migration_run(&self, run: &MigrationRun) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO migration_runs
                (name, applied_at, created, reused, failed, skipped_parents, failed_parents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.name,
                run.applied_at.to_rfc3339(),
                run.created,
                run.reused,
                run.failed,
                run.skipped_parents,
                run.failed_parents,
            ],
        )?;
        Ok(())
    }
}

fn row_to_migration_run(row: &Row<'_>) -> rusqlite::Result<MigrationRun> {
    let applied_at: String = row.get(1)?;
    Ok(MigrationRun {
        name: row.get(0)?,
        applied_at: parse_dt(&applied_at),
        created: row.get(2)?,
        reused: row.get(3)?,
        failed: row.get(4)?,
        skipped_parents: row.get(5)?,
        failed_parents: row.get(6)?,
    })
}
