//! Toggle Operator: a single flag change as a whole-value read-modify-write.

use crate::error::FlagResult;
use crate::flag_map::{self, ActiveFlagMap};
use crate::flag_store::FlagStore;

/// Writes `map` with `project_id` set to `new_value` and returns the new map.
///
/// The whole map is sent, never a delta. `map` is borrowed and never changed, so on a
/// `PersistFailed` error the caller still holds exactly what it had.
pub async fn toggle(
    store: &dyn FlagStore,
    map: &ActiveFlagMap,
    project_id: &str,
    new_value: bool,
) -> FlagResult<ActiveFlagMap> {
    let next = map.with_flag(project_id, new_value);
    store.set(&flag_map::encode(&next)).await?;
    tracing::info!(project_id = %project_id, active = new_value, "project flag stored");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlagError;
    use crate::flag_store::MemoryFlagStore;
    use async_trait::async_trait;

    struct RejectingStore;

    #[async_trait]
    impl FlagStore for RejectingStore {
        async fn get(&self) -> FlagResult<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _value: &str) -> FlagResult<()> {
            Err(FlagError::PersistFailed("read-only".into()))
        }
    }

    fn ab() -> ActiveFlagMap {
        [("A".to_string(), true), ("B".to_string(), false)]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn toggle_writes_whole_map() {
        let store = MemoryFlagStore::new();
        let next = toggle(&store, &ab(), "A", false).await.unwrap();
        assert_eq!(next.get("A"), Some(false));
        assert_eq!(next.get("B"), Some(false));
        assert_eq!(store.get().await.unwrap().as_deref(), Some(r#"{"A":false,"B":false}"#));
    }

    #[tokio::test]
    async fn failed_write_returns_persist_failed() {
        let before = ab();
        let err = toggle(&RejectingStore, &before, "B", true).await.unwrap_err();
        assert!(err.is_persist_failure());
        assert_eq!(before, ab());
    }
}
