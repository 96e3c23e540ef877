use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    #[default]
    Incomplete,
    InProgress,
    Complete,
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl std::str::FromStr for MilestoneStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "incomplete" => Ok(Self::Incomplete),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown milestone status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub team_id: String,
    pub name: String,
    /// Denormalized milestone blob kept by older releases (JSON array).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_milestones: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Card {
    pub id: String,
    pub project_id: String,
    pub title: String,
    /// Denormalized label names (JSON string array).
    pub legacy_labels: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Label {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
    pub status: MilestoneStatus,
    pub order: u32,
    pub created_at: DateTime<Utc>,
}

/// Ledger row for the latest run of a migration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MigrationRun {
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub created: u64,
    pub reused: u64,
    pub failed: u64,
    pub skipped_parents: u64,
    pub failed_parents: u64,
}

impl MigrationRun {
    /// A clean run leaves nothing for a later run to retry.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.failed_parents == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_status_round_trips_through_text() {
        for status in [
            MilestoneStatus::Incomplete,
            MilestoneStatus::InProgress,
            MilestoneStatus::Complete,
        ] {
            let parsed: MilestoneStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(
            "INCOMPLETE".parse::<MilestoneStatus>().unwrap(),
            MilestoneStatus::Incomplete
        );
        assert!("later".parse::<MilestoneStatus>().is_err());
    }
}
