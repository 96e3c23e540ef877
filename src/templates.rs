//! Default records the migrations materialize.
//!
//! The built-in sets are constants; a YAML file may replace either set without
//! changing how the migrations behave. Templates live in memory only and are
//! never mutated once built.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::model::MilestoneStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTemplate {
    pub name: String,
    pub color: String,
}

/// Milestone defaults as configured: the target date is an offset from the run's clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub offset_days: i64,
    #[serde(default)]
    pub status: MilestoneStatus,
}

/// A milestone ready to insert. Its position in the template list is its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneTemplate {
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub target_date: Option<DateTime<Utc>>,
    pub status: MilestoneStatus,
}

const DEFAULT_LABELS: &[(&str, &str)] = &[
    ("Bug", "#d73a4a"),
    ("Documentation", "#0075ca"),
    ("Duplicate", "#cfd3d7"),
    ("Enhancement", "#a2eeef"),
    ("Feature", "#7057ff"),
    ("Help Wanted", "#008672"),
    ("Invalid", "#e4e669"),
    ("Question", "#d876e3"),
    ("Urgent", "#b60205"),
    ("Design", "#f9d0c4"),
    ("Research", "#c5def5"),
];

const DEFAULT_MILESTONES: &[(&str, &str, &str, i64)] = &[
    (
        "Planning",
        "Define scope, requirements and success criteria",
        "Gather stakeholder input before committing to dates",
        7,
    ),
    (
        "Development",
        "Build the core functionality",
        "Track progress on the board and raise blockers early",
        30,
    ),
    (
        "Testing",
        "Verify behavior and fix defects",
        "Include regression and acceptance testing",
        45,
    ),
    (
        "Launch",
        "Release to users",
        "Prepare release notes and a rollback plan",
        60,
    ),
];

/// Template configuration for both migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub labels: Vec<LabelTemplate>,
    pub milestones: Vec<MilestoneConfig>,
}

/// On-disk shape: either section may be omitted.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateFile {
    #[serde(default)]
    labels: Option<Vec<LabelTemplate>>,
    #[serde(default)]
    milestones: Option<Vec<MilestoneConfig>>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            milestones: default_milestones(),
        }
    }
}

impl TemplateConfig {
    /// Built-in defaults, or the YAML file at `path` layered over them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let file: TemplateFile = serde_yaml::from_str(data)?;
        let defaults = Self::default();
        let mut config = Self {
            labels: file.labels.unwrap_or(defaults.labels),
            milestones: file.milestones.unwrap_or(defaults.milestones),
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trim names and titles so what is validated is exactly what gets inserted.
    fn normalize(&mut self) {
        for label in &mut self.labels {
            label.name = label.name.trim().to_string();
            label.color = label.color.trim().to_string();
        }
        for milestone in &mut self.milestones {
            milestone.title = milestone.title.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(MigrateError::Config("label template list is empty".into()));
        }
        if self.milestones.is_empty() {
            return Err(MigrateError::Config(
                "milestone template list is empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            let name = label.name.trim();
            if name.is_empty() {
                return Err(MigrateError::Config("label name must be non-empty".into()));
            }
            if !seen.insert(name) {
                return Err(MigrateError::Config(format!(
                    "duplicate label template '{name}'"
                )));
            }
            if !is_hex_color(&label.color) {
                return Err(MigrateError::Config(format!(
                    "label '{name}' has invalid color '{}' (expected #rrggbb)",
                    label.color
                )));
            }
        }

        let mut seen = HashSet::new();
        for milestone in &self.milestones {
            let title = milestone.title.trim();
            if title.is_empty() {
                return Err(MigrateError::Config(
                    "milestone title must be non-empty".into(),
                ));
            }
            if !seen.insert(title) {
                return Err(MigrateError::Config(format!(
                    "duplicate milestone template '{title}'"
                )));
            }
        }
        Ok(())
    }

}

/// Resolve offsets against `now`. Only the target dates depend on the clock.
pub fn resolve_milestones(entries: &[MilestoneConfig], now: DateTime<Utc>) -> Vec<MilestoneTemplate> {
    entries
        .iter()
        .map(|entry| MilestoneTemplate {
            title: entry.title.clone(),
            description: entry.description.clone(),
            notes: entry.notes.clone(),
            target_date: Some(now + Duration::days(entry.offset_days)),
            status: entry.status,
        })
        .collect()
}

pub fn default_labels() -> Vec<LabelTemplate> {
    DEFAULT_LABELS
        .iter()
        .map(|(name, color)| LabelTemplate {
            name: (*name).to_string(),
            color: (*color).to_string(),
        })
        .collect()
}

pub fn default_milestones() -> Vec<MilestoneConfig> {
    DEFAULT_MILESTONES
        .iter()
        .map(|(title, description, notes, offset_days)| MilestoneConfig {
            title: (*title).to_string(),
            description: Some((*description).to_string()),
            notes: Some((*notes).to_string()),
            offset_days: *offset_days,
            status: MilestoneStatus::Incomplete,
        })
        .collect()
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
