//! Flag Store: one tenant-wide slot holding the serialized ActiveFlagMap.
//!
//! Whole-value `get`/`set` only. No field access, no compare-and-swap, no versioning, so two
//! sessions doing read-modify-write on the slot race and the last writer wins.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{GatewayConfig, StoreBackend, DEFAULT_PROPERTY_KEY};
use crate::error::{FlagError, FlagResult};

const PROPERTIES_TREE: &str = "extension_properties";

#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Raw stored value. `None` (or an empty string) means nothing stored yet.
    /// A value that is not valid UTF-8 is `MalformedStoredMap`, not `StoreUnavailable`.
    async fn get(&self) -> FlagResult<Option<String>>;

    /// Overwrite the slot. Errors are `PersistFailed`.
    async fn set(&self, value: &str) -> FlagResult<()>;
}

/// Open the store selected by `config.store_backend`.
pub fn open_store(config: &GatewayConfig) -> FlagResult<Arc<dyn FlagStore>> {
    let store: Arc<dyn FlagStore> = match config.store_backend {
        StoreBackend::Sled => Arc::new(SledFlagStore::open(
            &config.storage_path,
            &config.property_key,
        )?),
        StoreBackend::Memory => Arc::new(MemoryFlagStore::new()),
    };
    Ok(store)
}

/// In-process slot. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    slot: RwLock<Option<String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Some(value.into())),
        }
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn get(&self) -> FlagResult<Option<String>> {
        Ok(self.slot.read().await.clone())
    }

    async fn set(&self, value: &str) -> FlagResult<()> {
        *self.slot.write().await = Some(value.to_string());
        Ok(())
    }
}

/// Sled-backed slot: tree `extension_properties`, one key.
pub struct SledFlagStore {
    tree: sled::Tree,
    key: String,
}

impl SledFlagStore {
    pub fn open(path: impl AsRef<Path>, key: &str) -> FlagResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            FlagError::StoreUnavailable(format!("open {}: {}", path.display(), e))
        })?;
        Self::from_db(&db, key)
    }

    pub fn from_db(db: &sled::Db, key: &str) -> FlagResult<Self> {
        let tree = db
            .open_tree(PROPERTIES_TREE)
            .map_err(|e| FlagError::StoreUnavailable(e.to_string()))?;
        let key = if key.trim().is_empty() {
            DEFAULT_PROPERTY_KEY.to_string()
        } else {
            key.to_string()
        };
        Ok(Self { tree, key })
    }
}

#[async_trait]
impl FlagStore for SledFlagStore {
    async fn get(&self) -> FlagResult<Option<String>> {
        let value = self
            .tree
            .get(self.key.as_bytes())
            .map_err(|e| FlagError::StoreUnavailable(e.to_string()))?;
        match value {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes.to_vec()).map(Some).map_err(|e| {
                FlagError::MalformedStoredMap(format!("stored value is not UTF-8: {}", e))
            }),
        }
    }

    async fn set(&self, value: &str) -> FlagResult<()> {
        self.tree
            .insert(self.key.as_bytes(), value.as_bytes())
            .map_err(|e| FlagError::PersistFailed(e.to_string()))?;
        self.tree
            .flush_async()
            .await
            .map_err(|e| FlagError::PersistFailed(format!("flush: {}", e)))?;
        tracing::debug!(key = %self.key, bytes = value.len(), "flag slot written");
        Ok(())
    }
}

/// Body of `GET getProjectProperty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyResponse {
    pub project_active_object: String,
}

/// Body of `POST setProjectProperty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPropertyRequest {
    pub project_active_object: String,
}

/// Reply of `POST setProjectProperty`: the stored value echoed back, or the error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPropertyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_active_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SetPropertyResponse {
    pub fn stored(value: String) -> Self {
        Self {
            success: true,
            project_active_object: Some(value),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            project_active_object: None,
            error: Some(error.into()),
        }
    }
}

/// The slot as exposed by a running gateway's `getProjectProperty`/`setProjectProperty`.
pub struct RemoteFlagStore {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteFlagStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FlagStore for RemoteFlagStore {
    async fn get(&self) -> FlagResult<Option<String>> {
        let url = format!("{}/getProjectProperty", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FlagError::StoreUnavailable(e.to_string()))?;
        let status = res.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            // The gateway holds a value it cannot read as text.
            let body: serde_json::Value = res.json().await.unwrap_or_default();
            let reason = body["error"].as_str().unwrap_or("unreadable stored value");
            return Err(FlagError::MalformedStoredMap(reason.to_string()));
        }
        if !status.is_success() {
            return Err(FlagError::StoreUnavailable(format!("status {}", status.as_u16())));
        }
        let body: PropertyResponse = res
            .json()
            .await
            .map_err(|e| FlagError::StoreUnavailable(format!("response parse: {}", e)))?;
        Ok(Some(body.project_active_object))
    }

    async fn set(&self, value: &str) -> FlagResult<()> {
        let url = format!("{}/setProjectProperty", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&SetPropertyRequest {
                project_active_object: value.to_string(),
            })
            .send()
            .await
            .map_err(|e| FlagError::PersistFailed(e.to_string()))?;
        let body: SetPropertyResponse = res
            .json()
            .await
            .map_err(|e| FlagError::PersistFailed(format!("response parse: {}", e)))?;
        if body.success {
            Ok(())
        } else {
            Err(FlagError::PersistFailed(
                body.error.unwrap_or_else(|| "store rejected write".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_starts_empty() {
        let store = MemoryFlagStore::new();
        assert_eq!(store.get().await.unwrap(), None);
        store.set(r#"{"A":true}"#).await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some(r#"{"A":true}"#));
    }

    #[tokio::test]
    async fn sled_handles_share_one_slot() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let a = SledFlagStore::from_db(&db, DEFAULT_PROPERTY_KEY).unwrap();
        let b = SledFlagStore::from_db(&db, DEFAULT_PROPERTY_KEY).unwrap();
        assert_eq!(a.get().await.unwrap(), None);
        a.set(r#"{"A":false}"#).await.unwrap();
        assert_eq!(b.get().await.unwrap().as_deref(), Some(r#"{"A":false}"#));

        let other_key = SledFlagStore::from_db(&db, "otherProperty").unwrap();
        assert_eq!(other_key.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sled_store_overwrites_whole_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledFlagStore::open(dir.path(), "").unwrap();
        store.set(r#"{"A":true,"B":true}"#).await.unwrap();
        store.set(r#"{"C":false}"#).await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some(r#"{"C":false}"#));
    }

    #[tokio::test]
    async fn sled_invalid_utf8_is_malformed_not_lossy() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        // Lossy decoding would turn this into the valid map {"\u{FFFD}A":true}.
        db.open_tree(PROPERTIES_TREE)
            .unwrap()
            .insert(DEFAULT_PROPERTY_KEY, &b"{\"\xffA\":true}"[..])
            .unwrap();
        let store = SledFlagStore::from_db(&db, DEFAULT_PROPERTY_KEY).unwrap();
        let err = store.get().await.unwrap_err();
        assert!(matches!(err, FlagError::MalformedStoredMap(ref m) if m.contains("UTF-8")));

        store.set(r#"{"A":true}"#).await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some(r#"{"A":true}"#));
    }

    #[test]
    fn set_property_response_omits_absent_fields() {
        let ok = serde_json::to_value(SetPropertyResponse::stored("{}".into())).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "projectActiveObject": "{}"}));
        let err = serde_json::to_value(SetPropertyResponse::failed("boom")).unwrap();
        assert_eq!(err, serde_json::json!({"success": false, "error": "boom"}));
    }
}
