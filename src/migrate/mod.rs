//! Idempotent conversion of legacy denormalized data into owned child rows.
//!
//! Every migration follows the same sequence: detect prior completion, build
//! the template set once, then visit every parent and materialize templates
//! into children. Errors are contained as close to where they happen as
//! possible: a failed child never stops its siblings, a failed parent never
//! stops the next parent. Only errors outside those loops abort the run.

pub mod labels;
pub mod milestones;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::report::{ChildFailure, ParentOutcome, ParentStatus, Report, summarize};
use crate::store::db::Db;

/// Where the applier looks for existing children before inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceScope {
    /// Any existing child means the parent is skipped as a whole.
    Parent,
    /// Each template is inserted; an existing child with the same name is reused.
    Name,
}

pub trait Named {
    fn name(&self) -> &str;
}

pub trait Owner: Named {
    fn id(&self) -> &str;
}

/// One parent/child migration (e.g. team labels, project milestones).
pub trait Migration {
    type Parent: Owner;
    type Template: Named + Clone;
    type Child: Named;

    /// Stable name, also the ledger key.
    fn name(&self) -> &'static str;

    fn scope(&self) -> ExistenceScope;

    /// Coarse global check: does the store already hold relations of the target kind?
    fn has_already_migrated(&self, db: &Db) -> Result<bool>;

    fn build_templates(&self, now: DateTime<Utc>) -> Vec<Self::Template>;

    fn list_parents(&self, db: &Db) -> Result<Vec<Self::Parent>>;

    fn count_children(&self, db: &Db, parent: &Self::Parent) -> Result<u64>;

    /// Templates to apply to one parent. Defaults to the shared set.
    fn templates_for(
        &self,
        _parent: &Self::Parent,
        defaults: &[Self::Template],
    ) -> Result<Vec<Self::Template>> {
        Ok(defaults.to_vec())
    }

    /// Insert one child. `order` is the template's 1-based position.
    fn create_child(
        &self,
        db: &Db,
        parent: &Self::Parent,
        template: &Self::Template,
        order: u32,
    ) -> Result<Self::Child>;

    fn find_child(
        &self,
        db: &Db,
        parent: &Self::Parent,
        template: &Self::Template,
    ) -> Result<Option<Self::Child>>;

    /// Follow-up work once a parent's children exist.
    fn after_parent(
        &self,
        _db: &Db,
        _parent: &Self::Parent,
        _outcome: &mut ParentOutcome,
    ) -> Result<()> {
        Ok(())
    }
}

/// Children materialized for one parent.
#[derive(Debug)]
pub struct ApplyResult<C> {
    pub created: Vec<C>,
    /// Names of children that already existed and were reused.
    pub skipped: Vec<String>,
    pub failed: Vec<ChildFailure>,
}

impl<C> Default for ApplyResult<C> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ParentApply<C> {
    /// Parent-scoped check found existing children.
    Skipped { existing: u64 },
    Applied(ApplyResult<C>),
}

/// Detector. A ledger row is authoritative: a clean run means done, a run with
/// failures means retry. Without a row the migration's own heuristic decides.
pub fn has_already_migrated<M: Migration>(db: &Db, migration: &M) -> Result<bool> {
    match db.migration_run(migration.name())? {
        Some(run) if run.is_clean() => {
            info!(
                migration = migration.name(),
                applied_at = %run.applied_at,
                "migration recorded in ledger"
            );
            Ok(true)
        }
        Some(run) => {
            info!(
                migration = migration.name(),
                failed = run.failed,
                failed_parents = run.failed_parents,
                "previous run had failures, retrying"
            );
            Ok(false)
        }
        None => migration.has_already_migrated(db),
    }
}

/// Materialize `templates` under one parent.
///
/// Only the initial count can fail the call; every per-template error is
/// captured in the result.
pub fn apply_to_parent<M: Migration>(
    db: &Db,
    migration: &M,
    parent: &M::Parent,
    templates: &[M::Template],
) -> Result<ParentApply<M::Child>> {
    let existing = migration.count_children(db, parent)?;
    if existing > 0 && migration.scope() == ExistenceScope::Parent {
        info!(
            migration = migration.name(),
            parent = parent.name(),
            existing,
            "parent already has children, skipping"
        );
        return Ok(ParentApply::Skipped { existing });
    }

    let mut result = ApplyResult::default();
    for (index, template) in templates.iter().enumerate() {
        let order = index as u32 + 1;
        match migration.create_child(db, parent, template, order) {
            Ok(child) => result.created.push(child),
            Err(err) if err.is_unique_violation() => {
                match migration.find_child(db, parent, template) {
                    Ok(Some(child)) => result.skipped.push(child.name().to_string()),
                    Ok(None) => result.failed.push(ChildFailure {
                        name: template.name().to_string(),
                        reason: format!("{err}, but no existing record was found"),
                    }),
                    Err(lookup_err) => result.failed.push(ChildFailure {
                        name: template.name().to_string(),
                        reason: lookup_err.to_string(),
                    }),
                }
            }
            Err(err) => {
                warn!(
                    migration = migration.name(),
                    parent = parent.name(),
                    child = template.name(),
                    error = %err,
                    "failed to create child"
                );
                result.failed.push(ChildFailure {
                    name: template.name().to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(ParentApply::Applied(result))
}

fn process_parent<M: Migration>(
    db: &Db,
    migration: &M,
    parent: &M::Parent,
    defaults: &[M::Template],
) -> ParentOutcome {
    let mut outcome = ParentOutcome::new(parent.id(), parent.name());

    let applied = migration
        .templates_for(parent, defaults)
        .and_then(|templates| apply_to_parent(db, migration, parent, &templates));

    match applied {
        Ok(ParentApply::Skipped { existing }) => {
            outcome.status = ParentStatus::Skipped { existing };
            return outcome;
        }
        Ok(ParentApply::Applied(result)) => {
            outcome.created = result
                .created
                .iter()
                .map(|child| child.name().to_string())
                .collect();
            outcome.skipped = result.skipped;
            outcome.failed = result.failed;
        }
        Err(err) => {
            warn!(
                migration = migration.name(),
                parent = parent.name(),
                error = %err,
                "failed to process parent"
            );
            outcome.status = ParentStatus::Failed {
                reason: err.to_string(),
            };
            return outcome;
        }
    }

    if let Err(err) = migration.after_parent(db, parent, &mut outcome) {
        warn!(
            migration = migration.name(),
            parent = parent.name(),
            error = %err,
            "follow-up step failed"
        );
        outcome.fail("follow-up", err.to_string());
    }
    outcome
}

/// Run a migration end to end against `db`.
///
/// `now` is the reference clock for time-relative template fields and the
/// ledger timestamp. Every completed run is recorded, failures included.
pub fn run_migration<M: Migration>(db: &Db, migration: &M, now: DateTime<Utc>) -> Result<Report> {
    info!(migration = migration.name(), "starting migration");

    if has_already_migrated(db, migration)? {
        info!(migration = migration.name(), "already migrated, nothing to do");
        return Ok(Report::already_migrated(migration.name()));
    }

    let templates = migration.build_templates(now);
    let parents = migration.list_parents(db)?;
    info!(
        migration = migration.name(),
        parents = parents.len(),
        templates = templates.len(),
        "applying templates"
    );

    let outcomes = parents
        .iter()
        .map(|parent| process_parent(db, migration, parent, &templates))
        .collect();
    let report = summarize(migration.name(), outcomes);

    db.record_migration_run(&report.to_ledger_entry(now))?;
    if report.is_clean() {
        info!(migration = migration.name(), "recorded in ledger");
    } else {
        warn!(
            migration = migration.name(),
            failed = report.totals.failed,
            failed_parents = report.totals.failed_parents,
            "run had failures; the next run will retry them"
        );
    }

    Ok(report)
}
