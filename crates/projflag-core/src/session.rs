//! Operator session: reconcile once, then accept toggles against the repaired map.
//!
//! A `Session` only exists after a successful reconciliation, so every toggle applies to a
//! map that already covers the directory. The session map advances only when the store
//! acknowledges a write.

use tracing::debug;

use crate::error::FlagResult;
use crate::flag_map::ActiveFlagMap;
use crate::project::{project_rows, Project, ProjectRow};
use crate::reconcile::{PersistOutcome, Reconciler};
use crate::toggle::toggle;

pub struct Session {
    reconciler: Reconciler,
    projects: Vec<Project>,
    active_map: ActiveFlagMap,
    last_persist: PersistOutcome,
}

impl Session {
    /// Runs reconciliation and opens the session on its result.
    pub async fn start(reconciler: Reconciler) -> FlagResult<Self> {
        let rec = reconciler.reconcile().await?;
        Ok(Self {
            reconciler,
            projects: rec.projects,
            active_map: rec.active_map,
            last_persist: rec.persist,
        })
    }

    /// Re-runs reconciliation. On error the session keeps its previous state.
    pub async fn refresh(&mut self) -> FlagResult<&PersistOutcome> {
        let rec = self.reconciler.reconcile().await?;
        self.projects = rec.projects;
        self.active_map = rec.active_map;
        self.last_persist = rec.persist;
        Ok(&self.last_persist)
    }

    /// Sets one project's flag. The session map changes only if the write succeeds.
    pub async fn set_active(&mut self, project_id: &str, active: bool) -> FlagResult<bool> {
        if !self.projects.iter().any(|p| p.id == project_id) {
            debug!(
                project_id = %project_id,
                "toggling a project outside the current directory listing"
            );
        }
        match toggle(self.reconciler.store().as_ref(), &self.active_map, project_id, active).await {
            Ok(next) => {
                self.active_map = next;
                self.last_persist = PersistOutcome::Written;
                Ok(active)
            }
            Err(e) => {
                self.last_persist = PersistOutcome::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Flips one project's flag; an unknown id becomes active. Returns the new value.
    pub async fn flip(&mut self, project_id: &str) -> FlagResult<bool> {
        let current = self.active_map.get(project_id).unwrap_or(false);
        self.set_active(project_id, !current).await
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn active_map(&self) -> &ActiveFlagMap {
        &self.active_map
    }

    /// Outcome of the most recent write attempted by this session.
    pub fn last_persist(&self) -> &PersistOutcome {
        &self.last_persist
    }

    pub fn rows(&self) -> Vec<ProjectRow> {
        project_rows(&self.projects, &self.active_map)
    }
}
