//! Projects as reported by the directory, and the joined row an admin view renders.

use serde::{Deserialize, Serialize};

use crate::flag_map::ActiveFlagMap;

/// A project from the directory. `id` is opaque and stable; `name` is display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One row of the admin table: a directory project joined with its flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// Joins projects (in directory order) with their flags. Unknown ids render as inactive.
pub fn project_rows(projects: &[Project], map: &ActiveFlagMap) -> Vec<ProjectRow> {
    projects
        .iter()
        .map(|p| ProjectRow {
            id: p.id.clone(),
            name: p.name.clone(),
            is_active: map.get(&p.id).unwrap_or(false),
        })
        .collect()
}
