use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::config::SiteDataConfig;
use crate::error::{Result, SiteDataError};
use crate::migrations::{self, Migration, MIGRATIONS};
use crate::origin::{OriginResolver, SharedNameResolver, SiteRef};
use crate::value::SiteValue;

#[derive(Debug, Clone)]
enum SetupState {
    Pending,
    Ready(u32),
    Failed(String),
}

/// Handle to the per-origin settings store.
///
/// Every operation waits for the one-time setup (migrations) to finish before
/// touching storage. Clones share the same connection and setup signal.
#[derive(Clone)]
pub struct SiteData {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    origins: OriginResolver,
    ready: watch::Receiver<SetupState>,
    db_path: Option<PathBuf>,
}

impl SiteData {
    /// Open (creating if needed) the database in `dir` and start migrations in
    /// the background. Must be called from within a Tokio runtime.
    pub fn spawn_setup(
        dir: &Path,
        config: &SiteDataConfig,
        names: SharedNameResolver,
    ) -> Result<Self> {
        Self::spawn_setup_with(dir, config, names, MIGRATIONS)
    }

    pub fn spawn_setup_with(
        dir: &Path,
        config: &SiteDataConfig,
        names: SharedNameResolver,
        steps: &'static [Migration],
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(&config.file_name);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", config.journal_mode.as_str())?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        tracing::debug!(path = %db_path.display(), "opened site data database");
        Self::start(conn, config, names, steps, Some(db_path))
    }

    /// Open and fully set up the database in `dir`, surfacing migration failures.
    pub async fn open(
        dir: &Path,
        config: &SiteDataConfig,
        names: SharedNameResolver,
    ) -> Result<Self> {
        let store = Self::spawn_setup(dir, config, names)?;
        store.setup_complete().await?;
        Ok(store)
    }

    pub async fn open_in_memory(config: &SiteDataConfig, names: SharedNameResolver) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open_in_memory()?;
        let store = Self::start(conn, config, names, MIGRATIONS, None)?;
        store.setup_complete().await?;
        Ok(store)
    }

    fn start(
        conn: Connection,
        config: &SiteDataConfig,
        names: SharedNameResolver,
        steps: &'static [Migration],
        db_path: Option<PathBuf>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SiteDataError::SetupFailed(format!("no tokio runtime: {e}")))?;
        let (tx, rx) = watch::channel(SetupState::Pending);
        let store = Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                origins: OriginResolver::new(config.alias_scheme.clone(), names),
                ready: rx,
                db_path,
            }),
        };
        let worker = store.clone();
        runtime.spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || {
                worker.with_conn(|conn| migrations::migrate(conn, steps))
            })
            .await;
            let state = match outcome {
                Ok(Ok(report)) => {
                    tracing::info!(
                        from = report.from,
                        version = report.to,
                        applied = report.applied.len(),
                        "site data setup complete"
                    );
                    SetupState::Ready(report.to)
                }
                Ok(Err(err)) => {
                    tracing::error!("site data setup failed: {err}");
                    SetupState::Failed(err.to_string())
                }
                Err(err) => {
                    tracing::error!("site data setup task failed: {err}");
                    SetupState::Failed(err.to_string())
                }
            };
            let _ = tx.send(state);
        });
        Ok(store)
    }

    /// Wait for setup to finish; returns the schema version reached.
    pub async fn setup_complete(&self) -> Result<u32> {
        let mut rx = self.inner.ready.clone();
        let settled = rx.wait_for(|s| !matches!(s, SetupState::Pending)).await;
        let state = match settled {
            Ok(state) => state.clone(),
            Err(_) => return Err(SiteDataError::SetupAbandoned),
        };
        match state {
            SetupState::Ready(version) => Ok(version),
            SetupState::Failed(msg) => Err(SiteDataError::SetupFailed(msg)),
            SetupState::Pending => Err(SiteDataError::SetupAbandoned),
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.inner.db_path.as_deref()
    }

    pub fn origin_resolver(&self) -> &OriginResolver {
        &self.inner.origins
    }

    /// Wait for setup, then normalize `site`. `None` means the call is a no-op.
    pub(crate) async fn ready_origin(&self, site: SiteRef<'_>) -> Result<Option<String>> {
        self.setup_complete().await?;
        Ok(self.inner.origins.resolve(site).await)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .conn
            .lock()
            .map_err(|_| SiteDataError::LockPoisoned)?;
        f(&mut guard)
    }

    // Offloads rusqlite work from async executors.
    pub(crate) async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.with_conn(f)).await?
    }

    /// Upsert `value` under `(origin, key)`. Returns `false` when no origin
    /// could be obtained and nothing was written.
    pub async fn set<'a>(
        &self,
        site: impl Into<SiteRef<'a>>,
        key: &str,
        value: impl Into<SiteValue>,
    ) -> Result<bool> {
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(false);
        };
        let key = key.to_string();
        let value = value.into();
        tracing::debug!(origin = %origin, key = %key, "set site data");
        self.blocking(move |conn| {
            upsert(conn, &origin, &key, &value)?;
            Ok(true)
        })
        .await
    }

    /// Read the value under `(origin, key)`. A missing row, a stored null and an
    /// unobtainable origin all read as `None`.
    pub async fn get<'a>(&self, site: impl Into<SiteRef<'a>>, key: &str) -> Result<Option<SiteValue>> {
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(None);
        };
        let key = key.to_string();
        self.blocking(move |conn| {
            let value: Option<SiteValue> = conn
                .query_row(
                    "SELECT value FROM sitedata WHERE origin = ?1 AND key = ?2",
                    params![origin, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.filter(|v| !v.is_null()))
        })
        .await
    }

    /// Delete the row under `(origin, key)` if present. Returns `false` when no
    /// origin could be obtained.
    pub async fn clear<'a>(&self, site: impl Into<SiteRef<'a>>, key: &str) -> Result<bool> {
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(false);
        };
        let key = key.to_string();
        tracing::debug!(origin = %origin, key = %key, "clear site data");
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM sitedata WHERE origin = ?1 AND key = ?2",
                params![origin, key],
            )?;
            Ok(true)
        })
        .await
    }

    /// Every `(key, value)` row stored for one origin, in insertion order.
    pub async fn entries<'a>(&self, site: impl Into<SiteRef<'a>>) -> Result<Vec<(String, SiteValue)>> {
        let Some(origin) = self.ready_origin(site.into()).await? else {
            return Ok(Vec::new());
        };
        self.blocking(move |conn| rows_with_prefix(conn, &origin, "")).await
    }

    pub async fn origins(&self) -> Result<Vec<String>> {
        self.setup_complete().await?;
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT origin FROM sitedata ORDER BY origin")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn schema_version(&self) -> Result<u32> {
        self.setup_complete().await?;
        self.blocking(|conn| migrations::user_version(conn)).await
    }
}

pub(crate) fn upsert(conn: &Connection, origin: &str, key: &str, value: &SiteValue) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sitedata (origin, key, value) VALUES (?1, ?2, ?3)",
        params![origin, key, value],
    )?;
    Ok(())
}

/// Rows for `origin` whose key starts with `prefix` (case-sensitive), in insertion order.
pub(crate) fn rows_with_prefix(
    conn: &Connection,
    origin: &str,
    prefix: &str,
) -> Result<Vec<(String, SiteValue)>> {
    let mut stmt = conn.prepare(
        "SELECT key, value FROM sitedata
         WHERE origin = ?1 AND substr(key, 1, length(?2)) = ?2
         ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![origin, prefix], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, SiteValue>(1)?))
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub(crate) fn delete_with_prefix(conn: &Connection, origin: &str, prefix: &str) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM sitedata WHERE origin = ?1 AND substr(key, 1, length(?2)) = ?2",
        params![origin, prefix],
    )?;
    Ok(n)
}
