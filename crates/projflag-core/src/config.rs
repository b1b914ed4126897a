//! Gateway configuration.
//!
//! Precedence: environment (`PROJFLAG__*`) > TOML file (`PROJFLAG_CONFIG`, default
//! `config/projflag.toml`) > defaults.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | bind_addr | 127.0.0.1 | Listen address. |
//! | port | 8000 | Listen port. |
//! | storage_path | ./data/projflag | Sled directory holding the flag slot. |
//! | property_key | projectActiveObject | Key of the single stored value. |
//! | store_backend | sled | `sled` or `memory`. |
//! | directory.base_url | (unset) | Directory root; unset uses `directory.static_projects`. |
//! | directory.token | (unset) | Bearer token for the directory. |
//! | directory.page_size | (unset) | Page size for `$skip`/`$top` paging. |
//! | directory.timeout_secs | 10 | Directory request timeout. |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FlagResult;
use crate::project::Project;

pub const DEFAULT_CONFIG_PATH: &str = "config/projflag.toml";
pub const DEFAULT_STORAGE_PATH: &str = "./data/projflag";
pub const DEFAULT_PROPERTY_KEY: &str = "projectActiveObject";

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Projects served when `base_url` is unset.
    #[serde(default)]
    pub static_projects: Vec<Project>,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            page_size: None,
            timeout_secs: default_timeout_secs(),
            static_projects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub port: u16,
    pub storage_path: String,
    pub property_key: String,
    #[serde(default)]
    pub store_backend: StoreBackend,
    #[serde(default)]
    pub directory: DirectorySettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8000,
            storage_path: DEFAULT_STORAGE_PATH.to_string(),
            property_key: DEFAULT_PROPERTY_KEY.to_string(),
            store_backend: StoreBackend::Sled,
            directory: DirectorySettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from `PROJFLAG_CONFIG` (or the default path, if present) and the environment.
    pub fn load() -> FlagResult<Self> {
        let path = std::env::var("PROJFLAG_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> FlagResult<Self> {
        let builder = config::Config::builder()
            .set_default("bind_addr", "127.0.0.1")?
            .set_default("port", 8000_i64)?
            .set_default("storage_path", DEFAULT_STORAGE_PATH)?
            .set_default("property_key", DEFAULT_PROPERTY_KEY)?
            .set_default("store_backend", "sled")?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("PROJFLAG").separator("__"))
            .build()?;

        Ok(built.try_deserialize()?)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GatewayConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.property_key, DEFAULT_PROPERTY_KEY);
        assert_eq!(cfg.store_backend, StoreBackend::Sled);
        assert!(cfg.directory.base_url.is_none());
        assert_eq!(cfg.directory.timeout_secs, 10);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projflag.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
port = 9100
store_backend = "memory"

[directory]
page_size = 50

[[directory.static_projects]]
id = "A"
name = "Alpha"
"#
        )
        .unwrap();

        let cfg = GatewayConfig::load_from(&path).unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.listen_addr(), "127.0.0.1:9100");
        assert_eq!(cfg.store_backend, StoreBackend::Memory);
        assert_eq!(cfg.directory.page_size, Some(50));
        assert_eq!(cfg.directory.static_projects, vec![Project::new("A", "Alpha")]);
    }
}
