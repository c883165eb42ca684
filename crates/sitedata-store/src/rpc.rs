//! JSON call surface exposed to other subsystems.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::origin::SiteRef;
use crate::permissions::app_grants_from_json;
use crate::store::SiteData;
use crate::value::{json_truthy, SiteValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum SiteDataCall {
    Get {
        url: String,
        key: String,
        #[serde(default, rename = "skipOriginResolution")]
        skip_origin_resolution: bool,
    },
    Set {
        url: String,
        key: String,
        value: SiteValue,
        #[serde(default, rename = "skipOriginResolution")]
        skip_origin_resolution: bool,
    },
    GetAllPermissions {
        url: String,
    },
    GetPermission {
        url: String,
        name: String,
    },
    GetAppPermissions {
        url: String,
    },
    SetPermission {
        url: String,
        name: String,
        /// Any JSON value; only its truthiness is stored.
        #[serde(default)]
        value: Value,
    },
    SetAppPermissions {
        url: String,
        #[serde(default)]
        grants: Value,
    },
    ClearPermission {
        url: String,
        name: String,
    },
    ClearPermissionEverywhere {
        name: String,
    },
    GetNetworkPermissions {
        url: String,
    },
}

fn site(url: &str, verbatim: bool) -> SiteRef<'_> {
    if verbatim {
        SiteRef::Origin(url)
    } else {
        SiteRef::Url(url)
    }
}

fn optional(value: Option<SiteValue>) -> Value {
    value.map(|v| v.to_json()).unwrap_or(Value::Null)
}

impl SiteData {
    /// Dispatch one call. Writes and empty reads render as `null`.
    pub async fn call(&self, call: SiteDataCall) -> Result<Value> {
        let out = match call {
            SiteDataCall::Get {
                url,
                key,
                skip_origin_resolution,
            } => optional(self.get(site(&url, skip_origin_resolution), &key).await?),
            SiteDataCall::Set {
                url,
                key,
                value,
                skip_origin_resolution,
            } => {
                self.set(site(&url, skip_origin_resolution), &key, value)
                    .await?;
                Value::Null
            }
            SiteDataCall::GetAllPermissions { url } => {
                let perms = self.get_all_permissions(url.as_str()).await?;
                Value::Object(
                    perms
                        .into_iter()
                        .map(|(k, v)| (k, v.to_json()))
                        .collect::<Map<String, Value>>(),
                )
            }
            SiteDataCall::GetPermission { url, name } => {
                optional(self.get_permission(url.as_str(), &name).await?)
            }
            SiteDataCall::GetAppPermissions { url } => {
                serde_json::to_value(self.get_app_permissions(url.as_str()).await?)?
            }
            SiteDataCall::SetPermission { url, name, value } => {
                self.set_permission(url.as_str(), &name, json_truthy(&value))
                    .await?;
                Value::Null
            }
            SiteDataCall::SetAppPermissions { url, grants } => {
                let grants = app_grants_from_json(&grants);
                self.set_app_permissions(url.as_str(), &grants).await?;
                Value::Null
            }
            SiteDataCall::ClearPermission { url, name } => {
                self.clear_permission(url.as_str(), &name).await?;
                Value::Null
            }
            SiteDataCall::ClearPermissionEverywhere { name } => {
                self.clear_permission_everywhere(&name).await?;
                Value::Null
            }
            SiteDataCall::GetNetworkPermissions { url } => {
                Value::from(self.get_network_permissions(url.as_str()).await?)
            }
        };
        Ok(out)
    }
}
