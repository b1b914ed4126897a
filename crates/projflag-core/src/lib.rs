//! projflag core library.
//! Keeps a tenant-wide project-id -> active flag map in step with the project directory.

pub mod config;
pub mod directory;
pub mod error;
pub mod flag_map;
pub mod flag_store;
pub mod project;
pub mod reconcile;
pub mod session;
pub mod toggle;

pub use config::{DirectorySettings, GatewayConfig, StoreBackend};
pub use directory::{DirectoryLookup, HttpDirectory, StaticDirectory};
pub use error::{FlagError, FlagResult};
pub use flag_map::{decode, encode, ActiveFlagMap, Decoded, EMPTY_MAP_JSON};
pub use flag_store::{
    open_store, FlagStore, MemoryFlagStore, PropertyResponse, RemoteFlagStore, SetPropertyRequest,
    SetPropertyResponse, SledFlagStore,
};
pub use project::{project_rows, Project, ProjectRow};
pub use reconcile::{PersistOutcome, Reconciler, Reconciliation};
pub use session::Session;
pub use toggle::toggle;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
