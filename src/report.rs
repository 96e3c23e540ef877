use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::MigrationRun;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildFailure {
    pub name: String,
    pub reason: String,
}

/// What happened to one parent as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParentStatus {
    Applied,
    /// Parent already owned children; nothing was supplemented.
    Skipped { existing: u64 },
    /// Parent-level failure; per-child work for it did not run.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentOutcome {
    pub parent_id: String,
    pub parent_name: String,
    #[serde(flatten)]
    pub status: ParentStatus,
    pub created: Vec<String>,
    /// Children that already existed and were reused.
    pub skipped: Vec<String>,
    pub failed: Vec<ChildFailure>,
    #[serde(skip_serializing_if = "is_zero")]
    pub links_created: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<String>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl ParentOutcome {
    pub fn new(parent_id: impl Into<String>, parent_name: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            parent_name: parent_name.into(),
            status: ParentStatus::Applied,
            created: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            links_created: 0,
            unmatched: Vec::new(),
        }
    }

    pub fn fail(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(ChildFailure {
            name: name.into(),
            reason: reason.into(),
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub parents: u64,
    pub created: u64,
    pub reused: u64,
    pub failed: u64,
    pub skipped_parents: u64,
    pub failed_parents: u64,
    pub links_created: u64,
    pub unmatched: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub migration: String,
    pub already_migrated: bool,
    pub totals: Totals,
    pub parents: Vec<ParentOutcome>,
}

impl Report {
    /// Early-exit report: nothing was read beyond the detector and nothing was written.
    pub fn already_migrated(migration: &str) -> Self {
        Self {
            migration: migration.to_string(),
            already_migrated: true,
            totals: Totals::default(),
            parents: Vec::new(),
        }
    }

    /// A run is clean when no child and no parent failed.
    pub fn is_clean(&self) -> bool {
        self.totals.failed == 0 && self.totals.failed_parents == 0
    }

    pub fn to_ledger_entry(&self, applied_at: DateTime<Utc>) -> MigrationRun {
        MigrationRun {
            name: self.migration.clone(),
            applied_at,
            created: self.totals.created,
            reused: self.totals.reused,
            failed: self.totals.failed,
            skipped_parents: self.totals.skipped_parents,
            failed_parents: self.totals.failed_parents,
        }
    }
}

/// Aggregate per-parent outcomes. The breakdown keeps the order parents were processed in.
pub fn summarize(migration: &str, outcomes: Vec<ParentOutcome>) -> Report {
    let mut totals = Totals {
        parents: outcomes.len() as u64,
        ..Totals::default()
    };

    for outcome in &outcomes {
        totals.created += outcome.created.len() as u64;
        totals.reused += outcome.skipped.len() as u64;
        totals.failed += outcome.failed.len() as u64;
        totals.links_created += outcome.links_created;
        totals.unmatched += outcome.unmatched.len() as u64;
        match outcome.status {
            ParentStatus::Applied => {}
            ParentStatus::Skipped { .. } => totals.skipped_parents += 1,
            ParentStatus::Failed { .. } => totals.failed_parents += 1,
        }
    }

    Report {
        migration: migration.to_string(),
        already_migrated: false,
        totals,
        parents: outcomes,
    }
}
