//! Permissions stored as ordinary site data rows under `perm:` keys.
//!
//! Three families share the namespace:
//! - `perm:<name>` scalar permissions, stored as `1`/`0`
//! - `perm:network:<origin>` network targets the site may reach
//! - `perm:app:<api>:<capability>` app capability grants; a row means granted
//!
//! API names may not contain `:`. Capabilities and network origins may, since
//! decoding only splits at the first `:` after the API name.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SiteDataError};
use crate::origin::SiteRef;
use crate::store::{self, SiteData};
use crate::value::SiteValue;

pub const PERM_PREFIX: &str = "perm:";
pub const NETWORK_PREFIX: &str = "perm:network:";
pub const APP_PREFIX: &str = "perm:app:";

/// Capability names granted per API, e.g. `{"fs": ["read", "write"]}`.
pub type AppGrants = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionKey {
    Scalar(String),
    Network(String),
    App { api: String, capability: String },
}

impl PermissionKey {
    /// Decode a permission name (the part after `perm:`) into its family.
    pub fn parse(name: &str) -> Result<Self> {
        if let Some(origin) = name.strip_prefix("network:") {
            return Ok(PermissionKey::Network(origin.to_string()));
        }
        if let Some(rest) = name.strip_prefix("app:") {
            let (api, capability) = rest.split_once(':').ok_or_else(|| {
                SiteDataError::InvalidPermission(format!("app permission without capability: {name}"))
            })?;
            return PermissionKey::app(api, capability);
        }
        Ok(PermissionKey::Scalar(name.to_string()))
    }

    pub fn app(api: impl Into<String>, capability: impl Into<String>) -> Result<Self> {
        let api = api.into();
        let capability = capability.into();
        if api.is_empty() || api.contains(':') {
            return Err(SiteDataError::InvalidPermission(format!(
                "api name {api:?} must be non-empty and free of ':'"
            )));
        }
        if capability.is_empty() {
            return Err(SiteDataError::InvalidPermission(format!(
                "empty capability for api {api:?}"
            )));
        }
        Ok(PermissionKey::App { api, capability })
    }

    pub fn from_storage_key(key: &str) -> Result<Self> {
        let name = key.strip_prefix(PERM_PREFIX).ok_or_else(|| {
            SiteDataError::InvalidPermission(format!("not a permission key: {key}"))
        })?;
        Self::parse(name)
    }

    pub fn name(&self) -> String {
        match self {
            PermissionKey::Scalar(name) => name.clone(),
            PermissionKey::Network(origin) => format!("network:{origin}"),
            PermissionKey::App { api, capability } => format!("app:{api}:{capability}"),
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{PERM_PREFIX}{}", self.name())
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Build grants from loosely typed JSON, skipping entries that are not arrays
/// and array items that are not strings.
pub fn app_grants_from_json(raw: &Value) -> AppGrants {
    let mut grants = AppGrants::new();
    let Some(obj) = raw.as_object() else {
        return grants;
    };
    for (api, caps) in obj {
        let Some(caps) = caps.as_array() else {
            continue;
        };
        grants.insert(
            api.clone(),
            caps.iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect(),
        );
    }
    grants
}

fn perm_key(name: &str) -> String {
    format!("{PERM_PREFIX}{name}")
}

impl SiteData {
    pub async fn get_permission<'a>(
        &self,
        site: impl Into<SiteRef<'a>>,
        name: &str,
    ) -> Result<Option<SiteValue>> {
        self.get(site, &perm_key(name)).await
    }

    /// Store `1` for a truthy `value`, `0` otherwise.
    pub async fn set_permission<'a>(
        &self,
        site: impl Into<SiteRef<'a>>,
        name: &str,
        value: impl Into<SiteValue>,
    ) -> Result<bool> {
        let value: SiteValue = value.into();
        let flag = SiteValue::from(value.is_truthy());
        self.set(site, &perm_key(name), flag).await
    }

    pub async fn clear_permission<'a>(&self, site: impl Into<SiteRef<'a>>, name: &str) -> Result<bool> {
        self.clear(site, &perm_key(name)).await
    }

    /// Delete `perm:<name>` for every origin. Returns the number of rows removed.
    pub async fn clear_permission_everywhere(&self, name: &str) -> Result<usize> {
        self.setup_complete().await?;
        let key = perm_key(name);
        tracing::debug!(key = %key, "clear permission for all origins");
        self.blocking(move |conn| {
            let n = conn.execute("DELETE FROM sitedata WHERE key = ?1", [&key])?;
            Ok(n)
        })
        .await
    }

    /// Every `perm:` row for the origin, keyed by the name after `perm:`.
    pub async fn get_all_permissions<'a>(
        &self,
        site: impl Into<SiteRef<'a>>,
    ) -> Result<BTreeMap<String, SiteValue>> {
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(BTreeMap::new());
        };
        let rows = self
            .blocking(move |conn| store::rows_with_prefix(conn, &origin, PERM_PREFIX))
            .await?;
        let mut perms = BTreeMap::new();
        for (key, value) in rows {
            perms.insert(key[PERM_PREFIX.len()..].to_string(), value);
        }
        Ok(perms)
    }

    /// Network origins the site has been granted (rows with a truthy value).
    ///
    /// Each target is the whole name after `perm:network:`, colons included:
    /// `perm:network:https:b.com` yields `https:b.com`, not just the last
    /// `:`-separated segment.
    pub async fn get_network_permissions<'a>(&self, site: impl Into<SiteRef<'a>>) -> Result<Vec<String>> {
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(Vec::new());
        };
        let rows = self
            .blocking(move |conn| store::rows_with_prefix(conn, &origin, NETWORK_PREFIX))
            .await?;
        let mut out = Vec::new();
        for (key, value) in rows {
            if !value.is_truthy() {
                continue;
            }
            if let Ok(PermissionKey::Network(target)) = PermissionKey::from_storage_key(&key) {
                out.push(target);
            }
        }
        Ok(out)
    }

    pub async fn get_app_permissions<'a>(&self, site: impl Into<SiteRef<'a>>) -> Result<AppGrants> {
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(AppGrants::new());
        };
        let rows = self
            .blocking(move |conn| store::rows_with_prefix(conn, &origin, APP_PREFIX))
            .await?;
        let mut grants = AppGrants::new();
        for (key, _) in rows {
            match PermissionKey::from_storage_key(&key) {
                Ok(PermissionKey::App { api, capability }) => {
                    grants.entry(api).or_default().push(capability);
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(key = %key, "skipping app permission row: {err}"),
            }
        }
        Ok(grants)
    }

    /// Replace the origin's full set of app grants. Existing `perm:app:` rows are
    /// removed and one row per `(api, capability)` is written, in one transaction.
    pub async fn set_app_permissions<'a>(
        &self,
        site: impl Into<SiteRef<'a>>,
        grants: &AppGrants,
    ) -> Result<bool> {
        let mut keys = Vec::new();
        for (api, caps) in grants {
            for cap in caps {
                keys.push(PermissionKey::app(api.as_str(), cap.as_str())?.storage_key());
            }
        }
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(false);
        };
        tracing::debug!(origin = %origin, grants = keys.len(), "replace app permissions");
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            store::delete_with_prefix(&tx, &origin, APP_PREFIX)?;
            let granted = SiteValue::from(1);
            for key in &keys {
                store::upsert(&tx, &origin, key, &granted)?;
            }
            tx.commit()?;
            Ok(true)
        })
        .await
    }
}
