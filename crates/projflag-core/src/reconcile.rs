//! Reconciler: merges the live project list with the stored map.
//!
//! Missing projects are added as inactive and the map is written back only when something
//! was added. Ids that left the directory are never pruned, so a second run against the
//! same directory is a no-op.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::directory::DirectoryLookup;
use crate::error::{FlagError, FlagResult};
use crate::flag_map::{self, ActiveFlagMap, Decoded};
use crate::flag_store::FlagStore;
use crate::project::{project_rows, Project, ProjectRow};

/// What happened to the write-back step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum PersistOutcome {
    /// The stored map already covered every project.
    NotNeeded,
    Written,
    /// The merged map could not be stored; it is still returned to the caller.
    Failed(String),
}

impl PersistOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PersistOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub projects: Vec<Project>,
    pub active_map: ActiveFlagMap,
    /// Ids inserted as inactive by this run.
    pub added: Vec<String>,
    /// `MalformedStoredMap` when the stored value was replaced by an empty map.
    pub malformed: Option<FlagError>,
    pub persist: PersistOutcome,
}

impl Reconciliation {
    pub fn rows(&self) -> Vec<ProjectRow> {
        project_rows(&self.projects, &self.active_map)
    }
}

#[derive(Clone)]
pub struct Reconciler {
    directory: Arc<dyn DirectoryLookup>,
    store: Arc<dyn FlagStore>,
}

impl Reconciler {
    pub fn new(directory: Arc<dyn DirectoryLookup>, store: Arc<dyn FlagStore>) -> Self {
        Self { directory, store }
    }

    pub fn store(&self) -> &Arc<dyn FlagStore> {
        &self.store
    }

    /// Fetch, merge, and write back if anything was added.
    ///
    /// Fails with `DirectoryUnavailable` if the project list cannot be fetched and with
    /// `StoreUnavailable` if the slot cannot be read; in both cases nothing is written.
    /// A failed write-back is reported in [`Reconciliation::persist`], not as an error.
    pub async fn reconcile(&self) -> FlagResult<Reconciliation> {
        let (projects, stored) = tokio::join!(self.directory.list_projects(), self.store.get());
        let projects = projects?;
        let decoded = match stored {
            Ok(stored) => flag_map::decode_stored(stored.as_deref()),
            Err(FlagError::MalformedStoredMap(reason)) => Decoded::Malformed { reason },
            Err(e) => return Err(e),
        };
        let malformed = decoded
            .malformed_reason()
            .map(|reason| FlagError::MalformedStoredMap(reason.to_string()));
        if let Some(e) = &malformed {
            warn!(error = %e, "continuing with an empty flag map");
        }
        let mut active_map = decoded.into_map_or_empty();

        let added = active_map.fill_missing(&projects);
        let persist = if added.is_empty() {
            PersistOutcome::NotNeeded
        } else {
            match self.store.set(&flag_map::encode(&active_map)).await {
                Ok(()) => {
                    info!(
                        added = added.len(),
                        total = active_map.len(),
                        "flag map repaired and stored"
                    );
                    PersistOutcome::Written
                }
                Err(e) => {
                    warn!(error = %e, added = added.len(), "flag map repair could not be stored");
                    PersistOutcome::Failed(e.to_string())
                }
            }
        };

        Ok(Reconciliation {
            projects,
            active_map,
            added,
            malformed,
            persist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::flag_store::MemoryFlagStore;

    fn reconciler(
        projects: Vec<Project>,
        stored: Option<&str>,
    ) -> (Reconciler, Arc<MemoryFlagStore>) {
        let store = Arc::new(match stored {
            Some(v) => MemoryFlagStore::with_value(v),
            None => MemoryFlagStore::new(),
        });
        let r = Reconciler::new(Arc::new(StaticDirectory::new(projects)), store.clone());
        (r, store)
    }

    #[tokio::test]
    async fn first_run_on_empty_store_writes_defaults() {
        let (r, store) = reconciler(vec![Project::new("A", "Alpha")], None);
        let out = r.reconcile().await.unwrap();
        assert_eq!(out.added, vec!["A".to_string()]);
        assert_eq!(out.persist, PersistOutcome::Written);
        assert!(out.malformed.is_none());
        assert_eq!(store.get().await.unwrap().as_deref(), Some(r#"{"A":false}"#));
    }

    #[tokio::test]
    async fn covered_map_is_not_rewritten() {
        let (r, _) = reconciler(vec![Project::new("A", "Alpha")], Some(r#"{"A":true}"#));
        let out = r.reconcile().await.unwrap();
        assert_eq!(out.persist, PersistOutcome::NotNeeded);
        assert!(out.added.is_empty());
        assert!(out.rows()[0].is_active);
    }

    #[test]
    fn persist_outcome_serializes_with_status_tag() {
        assert_eq!(
            serde_json::to_value(PersistOutcome::NotNeeded).unwrap(),
            serde_json::json!({"status": "not_needed"})
        );
        assert_eq!(
            serde_json::to_value(PersistOutcome::Failed("disk".into())).unwrap(),
            serde_json::json!({"status": "failed", "error": "disk"})
        );
    }
}
