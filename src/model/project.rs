use serde::{Deserialize, Serialize};

use super::{EntityId, UserSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub creator: Option<UserSummary>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub task_count: u32,
    #[serde(default)]
    pub event_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Completed,
    Archived,
}

/// Project reference embedded in events and tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: EntityId,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub user: UserSummary,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: String,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
}

fn default_color() -> String {
    "#3b82f6".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_counts_default_to_zero() {
        let project: Project =
            serde_json::from_str(r##"{"id": 4, "name": "Apollo", "color": "#111111"}"##).unwrap();

        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.member_count, 0);
        assert_eq!(project.task_count, 0);
        assert_eq!(project.event_count, 0);
    }

    #[test]
    fn archived_status_round_trips_lowercase() {
        let json = serde_json::to_string(&ProjectStatus::Archived).unwrap();

        assert_eq!(json, "\"archived\"");
    }
}
