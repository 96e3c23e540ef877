//! Project milestones, seeded from the legacy JSON blob when a project has one.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{MigrateError, Result};
use crate::migrate::{ExistenceScope, Migration, Named, Owner};
use crate::model::{Milestone, MilestoneStatus, Project};
use crate::store::db::{Db, NewMilestone};
use crate::templates::{MilestoneConfig, MilestoneTemplate, resolve_milestones};

impl Named for Project {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Owner for Project {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Named for Milestone {
    fn name(&self) -> &str {
        &self.title
    }
}

impl Named for MilestoneTemplate {
    fn name(&self) -> &str {
        &self.title
    }
}

/// One entry of the legacy `projects.legacy_milestones` blob.
#[derive(Debug, Deserialize)]
struct LegacyMilestone {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default, alias = "targetDate")]
    target_date: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<String>,
}

/// Parse a legacy blob. `None` when the project has nothing worth converting.
pub fn parse_legacy_milestones(project: &Project) -> Result<Option<Vec<MilestoneTemplate>>> {
    let Some(blob) = project.legacy_milestones.as_deref() else {
        return Ok(None);
    };
    let blob = blob.trim();
    if blob.is_empty() || blob == "null" {
        return Ok(None);
    }

    let invalid = |reason: String| MigrateError::InvalidLegacyData {
        owner: format!("project {}", project.name),
        reason,
    };

    let entries: Vec<LegacyMilestone> =
        serde_json::from_str(blob).map_err(|err| invalid(err.to_string()))?;
    if entries.is_empty() {
        return Ok(None);
    }

    let mut templates = Vec::with_capacity(entries.len());
    for entry in entries {
        let title = entry.title.trim().to_string();
        if title.is_empty() {
            return Err(invalid("milestone with empty title".into()));
        }
        let status = match entry.status.as_deref() {
            None => MilestoneStatus::Incomplete,
            Some(raw) => raw.parse::<MilestoneStatus>().map_err(invalid)?,
        };
        templates.push(MilestoneTemplate {
            title,
            description: entry.description,
            notes: entry.notes,
            target_date: entry.target_date,
            status,
        });
    }
    Ok(Some(templates))
}

pub struct MilestoneMigration {
    milestones: Vec<MilestoneConfig>,
}

impl MilestoneMigration {
    pub const NAME: &'static str = "milestones";

    pub fn new(milestones: Vec<MilestoneConfig>) -> Self {
        Self { milestones }
    }
}

impl Migration for MilestoneMigration {
    type Parent = Project;
    type Template = MilestoneTemplate;
    type Child = Milestone;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn scope(&self) -> ExistenceScope {
        ExistenceScope::Parent
    }

    fn has_already_migrated(&self, db: &Db) -> Result<bool> {
        db.any_project_with_milestone()
    }

    fn build_templates(&self, now: DateTime<Utc>) -> Vec<MilestoneTemplate> {
        resolve_milestones(&self.milestones, now)
    }

    fn list_parents(&self, db: &Db) -> Result<Vec<Project>> {
        db.list_projects()
    }

    fn count_children(&self, db: &Db, project: &Project) -> Result<u64> {
        db.count_milestones(&project.id)
    }

    fn templates_for(
        &self,
        project: &Project,
        defaults: &[MilestoneTemplate],
    ) -> Result<Vec<MilestoneTemplate>> {
        Ok(parse_legacy_milestones(project)?.unwrap_or_else(|| defaults.to_vec()))
    }

    fn create_child(
        &self,
        db: &Db,
        project: &Project,
        template: &MilestoneTemplate,
        order: u32,
    ) -> Result<Milestone> {
        db.create_milestone(
            &project.id,
            &NewMilestone {
                title: &template.title,
                description: template.description.as_deref(),
                notes: template.notes.as_deref(),
                target_date: template.target_date,
                status: template.status,
                order,
            },
        )
    }

    fn find_child(
        &self,
        db: &Db,
        project: &Project,
        template: &MilestoneTemplate,
    ) -> Result<Option<Milestone>> {
        db.find_milestone(&project.id, &template.title)
    }
}
