//! Per-origin settings store backed by SQLite.
//!
//! Values are kept under `(origin, key)` pairs where the origin is the
//! `scheme:host` of a URL. Hosts under the alias scheme are resolved through a
//! [`NameResolver`] first; URLs with no obtainable origin turn every operation
//! into a no-op. Permissions are a key convention on top of the same table,
//! and a small set of favicon rows is seeded by the schema migrations.

pub mod config;
pub mod error;
pub mod migrations;
pub mod origin;
pub mod permissions;
pub mod rpc;
pub mod store;
pub mod value;

pub use config::SiteDataConfig;
pub use error::{Result, SiteDataError};
pub use migrations::{Migration, MigrationReport, SeedRecord, MIGRATIONS};
pub use origin::{
    NameResolver, NoAliasResolver, OriginResolver, SharedNameResolver, SiteRef,
    StaticNameResolver,
};
pub use permissions::{app_grants_from_json, AppGrants, PermissionKey};
pub use rpc::SiteDataCall;
pub use store::SiteData;
pub use value::{json_truthy, SiteValue};
