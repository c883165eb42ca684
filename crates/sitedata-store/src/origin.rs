//! Origin normalization: `scheme:host`, with alias-scheme hosts resolved
//! through an external name lookup before they count as part of an origin.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// External lookup that maps an alias host to its canonical host.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, name: &str) -> anyhow::Result<String>;
}

pub type SharedNameResolver = Arc<dyn NameResolver>;

/// Fixed lookup table, handy for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticNameResolver {
    names: HashMap<String, String>,
}

impl StaticNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.insert(name, target);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, target: impl Into<String>) {
        let name: String = name.into();
        self.names.insert(name.to_ascii_lowercase(), target.into());
    }
}

#[async_trait]
impl NameResolver for StaticNameResolver {
    async fn resolve_name(&self, name: &str) -> anyhow::Result<String> {
        self.names
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| anyhow!("no record for {name}"))
    }
}

/// Resolver for deployments without an alias lookup; every alias origin is unobtainable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAliasResolver;

#[async_trait]
impl NameResolver for NoAliasResolver {
    async fn resolve_name(&self, name: &str) -> anyhow::Result<String> {
        Err(anyhow!("alias lookup unavailable for {name}"))
    }
}

/// Where an operation's origin comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteRef<'a> {
    /// A URL to normalize (and resolve, for the alias scheme).
    Url(&'a str),
    /// An origin string that is already normalized and is used verbatim.
    Origin(&'a str),
}

impl<'a> From<&'a str> for SiteRef<'a> {
    fn from(url: &'a str) -> Self {
        SiteRef::Url(url)
    }
}

impl<'a> From<&'a String> for SiteRef<'a> {
    fn from(url: &'a String) -> Self {
        SiteRef::Url(url.as_str())
    }
}

#[derive(Clone)]
pub struct OriginResolver {
    alias_scheme: String,
    names: SharedNameResolver,
}

impl std::fmt::Debug for OriginResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginResolver")
            .field("alias_scheme", &self.alias_scheme)
            .finish_non_exhaustive()
    }
}

impl OriginResolver {
    pub fn new(alias_scheme: impl Into<String>, names: SharedNameResolver) -> Self {
        let alias_scheme: String = alias_scheme.into();
        Self {
            alias_scheme: alias_scheme.to_ascii_lowercase(),
            names,
        }
    }

    pub fn alias_scheme(&self) -> &str {
        &self.alias_scheme
    }

    /// Returns `None` when no origin can be obtained; callers treat that as a no-op.
    pub async fn resolve(&self, site: SiteRef<'_>) -> Option<String> {
        match site {
            SiteRef::Origin(origin) => Some(origin.to_string()),
            SiteRef::Url(raw) => self.resolve_url(raw).await,
        }
    }

    pub async fn resolve_url(&self, raw: &str) -> Option<String> {
        let (scheme, host) = match split_origin(raw) {
            Some(parts) => parts,
            None => {
                tracing::debug!(url = raw, "no origin in url");
                return None;
            }
        };
        if scheme != self.alias_scheme {
            return Some(format!("{scheme}:{host}"));
        }
        match self.names.resolve_name(&host).await {
            Ok(resolved) if !resolved.is_empty() => Some(format!("{scheme}:{resolved}")),
            Ok(_) => {
                tracing::warn!(scheme = %scheme, host = %host, "alias lookup returned nothing");
                None
            }
            Err(err) => {
                tracing::warn!(scheme = %scheme, host = %host, "alias lookup failed: {err}");
                None
            }
        }
    }
}

/// Split a URL into its scheme and host (with an explicit non-default port).
fn split_origin(raw: &str) -> Option<(String, String)> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    let host = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Some((parsed.scheme().to_string(), host))
}
