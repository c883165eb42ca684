//! Versioned schema migrations for the site data database.
//!
//! Steps are plain data (DDL plus seed rows) applied in order by [`migrate`].
//! The applied version lives in `PRAGMA user_version`, written in the same
//! transaction as the step, so a failed step leaves the counter untouched and
//! is retried from scratch on the next start.

use rusqlite::{params, Connection};

use crate::error::{Result, SiteDataError};

/// A row inserted (or replaced) while applying a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedRecord {
    pub origin: &'static str,
    pub key: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Schema version recorded once this step is applied.
    pub version: u32,
    pub description: &'static str,
    /// Idempotent statements, executed before the seed rows.
    pub statements: &'static [&'static str],
    pub seeds: &'static [SeedRecord],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<u32>,
}

const fn favicon(origin: &'static str, value: &'static str) -> SeedRecord {
    SeedRecord {
        origin,
        key: "favicon",
        value,
    }
}

/// Migrations for the site data store. Gaps left by retired favicon batches
/// are kept as empty steps so existing version numbers stay meaningful.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "sitedata table and default bookmark favicons",
        statements: &[
            "CREATE TABLE IF NOT EXISTS sitedata(
               origin NOT NULL,
               key NOT NULL,
               value
             )",
            "CREATE UNIQUE INDEX IF NOT EXISTS sitedata_origin_key ON sitedata (origin, key)",
        ],
        seeds: &[
            favicon(
                "https:duckduckgo.com",
                include_str!("../seeds/duckduckgo.com.favicon"),
            ),
            // beakerbrowser.com
            favicon(
                "dat:87ed2e3b160f261a032af03921a3bd09227d0a4cde73466c17114816cae43336",
                include_str!("../seeds/beakerbrowser.com.favicon"),
            ),
        ],
    },
    Migration {
        version: 2,
        description: "retired favicon batch",
        statements: &[],
        seeds: &[],
    },
    Migration {
        version: 3,
        description: "more default bookmark favicons",
        statements: &[],
        seeds: &[
            favicon(
                "https:hashbase.io",
                include_str!("../seeds/hashbase.io.favicon"),
            ),
            favicon(
                "https:twitter.com",
                include_str!("../seeds/twitter.com.favicon"),
            ),
            favicon(
                "https:github.com",
                include_str!("../seeds/github.com.favicon"),
            ),
        ],
    },
    Migration {
        version: 4,
        description: "retired favicon batch",
        statements: &[],
        seeds: &[],
    },
    Migration {
        version: 5,
        description: "more default bookmark favicons",
        statements: &[],
        seeds: &[
            favicon(
                "https:opencollective.com",
                include_str!("../seeds/opencollective.com.favicon"),
            ),
            // datprotocol.org
            favicon(
                "dat:6ff62299bf38ee578c18cf698957b7b162a35a9aceb157345c79dbde26eba524",
                include_str!("../seeds/datprotocol.org.favicon"),
            ),
        ],
    },
];

pub fn latest_version(steps: &[Migration]) -> u32 {
    steps.last().map(|m| m.version).unwrap_or(0)
}

/// Read the persisted schema version; 0 for a fresh database.
pub fn user_version(conn: &Connection) -> Result<u32> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    u32::try_from(v)
        .map_err(|_| SiteDataError::Config(format!("unreadable schema version {v} (user_version)")))
}

/// Bring `conn` up to the last version in `steps`, skipping steps already recorded.
pub fn migrate(conn: &mut Connection, steps: &[Migration]) -> Result<MigrationReport> {
    for (idx, step) in steps.iter().enumerate() {
        if step.version as usize != idx + 1 {
            return Err(SiteDataError::Config(format!(
                "migration steps must be numbered from 1 without gaps (found {} at position {})",
                step.version,
                idx + 1
            )));
        }
    }
    let supported = latest_version(steps);
    let from = user_version(conn)?;
    if from > supported {
        return Err(SiteDataError::FutureSchema {
            found: from,
            supported,
        });
    }

    let mut applied = Vec::new();
    for step in steps.iter().filter(|m| m.version > from) {
        apply_step(conn, step).map_err(|source| SiteDataError::Migration {
            version: step.version,
            source,
        })?;
        tracing::info!(
            version = step.version,
            description = step.description,
            "applied site data migration"
        );
        applied.push(step.version);
    }
    Ok(MigrationReport {
        from,
        to: supported,
        applied,
    })
}

fn apply_step(conn: &mut Connection, step: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for sql in step.statements {
        tx.execute_batch(sql)?;
    }
    if !step.seeds.is_empty() {
        let mut insert = tx.prepare(
            "INSERT OR REPLACE INTO sitedata (origin, key, value) VALUES (?1, ?2, ?3)",
        )?;
        for seed in step.seeds {
            insert.execute(params![seed.origin, seed.key, seed.value])?;
        }
    }
    // PRAGMA does not take bound parameters; the version is an integer.
    tx.execute_batch(&format!("PRAGMA user_version = {}", step.version))?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM sitedata", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn steps_are_numbered_consecutively() {
        for (idx, step) in MIGRATIONS.iter().enumerate() {
            assert_eq!(step.version as usize, idx + 1);
        }
        assert_eq!(latest_version(MIGRATIONS), 5);
    }

    #[test]
    fn seed_payloads_are_data_uris() {
        for seed in MIGRATIONS.iter().flat_map(|m| m.seeds) {
            assert_eq!(seed.key, "favicon");
            assert!(seed.value.starts_with("data:image/png;base64,"), "{}", seed.origin);
            assert!(!seed.value.contains('\n'));
        }
    }

    #[test]
    fn fresh_database_reaches_latest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = migrate(&mut conn, MIGRATIONS).unwrap();
        assert_eq!(report.from, 0);
        assert_eq!(report.to, 5);
        assert_eq!(report.applied, vec![1, 2, 3, 4, 5]);
        assert_eq!(user_version(&conn).unwrap(), 5);
        assert_eq!(count_rows(&conn), 7);
    }

    #[test]
    fn rerun_applies_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, MIGRATIONS).unwrap();
        conn.execute(
            "UPDATE sitedata SET value = 'edited' WHERE origin = 'https:github.com'",
            [],
        )
        .unwrap();
        let report = migrate(&mut conn, MIGRATIONS).unwrap();
        assert!(report.applied.is_empty());
        let v: String = conn
            .query_row(
                "SELECT value FROM sitedata WHERE origin = 'https:github.com'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(v, "edited");
    }

    #[test]
    fn resumes_from_recorded_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, &MIGRATIONS[..3]).unwrap();
        assert_eq!(user_version(&conn).unwrap(), 3);
        assert_eq!(count_rows(&conn), 5);
        let report = migrate(&mut conn, MIGRATIONS).unwrap();
        assert_eq!(report.applied, vec![4, 5]);
        assert_eq!(count_rows(&conn), 7);
    }

    #[test]
    fn failed_step_keeps_previous_version() {
        static BROKEN: &[Migration] = &[
            Migration {
                version: 1,
                description: "table",
                statements: &["CREATE TABLE IF NOT EXISTS sitedata(origin NOT NULL, key NOT NULL, value)"],
                seeds: &[],
            },
            Migration {
                version: 2,
                description: "broken",
                statements: &[
                    "CREATE TABLE IF NOT EXISTS extra(x)",
                    "INSERT INTO missing_table VALUES (1)",
                ],
                seeds: &[],
            },
        ];
        let mut conn = Connection::open_in_memory().unwrap();
        let err = migrate(&mut conn, BROKEN).unwrap_err();
        assert!(matches!(err, SiteDataError::Migration { version: 2, .. }));
        assert_eq!(user_version(&conn).unwrap(), 1);
        let extra: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'extra'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(extra, 0, "partial step must roll back");
    }

    #[test]
    fn refuses_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 9").unwrap();
        let err = migrate(&mut conn, MIGRATIONS).unwrap_err();
        assert!(matches!(
            err,
            SiteDataError::FutureSchema {
                found: 9,
                supported: 5
            }
        ));
    }

    #[test]
    fn refuses_negative_schema_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = -1").unwrap();
        let err = migrate(&mut conn, MIGRATIONS).unwrap_err();
        assert!(matches!(err, SiteDataError::Config(_)));
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'sitedata'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }
}
