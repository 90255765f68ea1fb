// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of BundleGate.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use std::path::Path;

use bundlegate_core::store::{BundleFilter, BundleStore, StatusChange, StoreError};
use bundlegate_core::{
    Bundle, BundleStatus, NewBundle, NewUpdateLog, Platform, RolloutPercentage, UpdateLog,
    Version,
};

const BUNDLE_COLUMNS: &str = "id, platform, version, min_app_version, max_app_version, \
     rollout_percentage, status, artifact_key, hash, size, created_at";

/// SQLite-backed bundle store.
///
/// A single connection behind a mutex: every read and every status batch
/// runs under the same lock, and batches additionally run in a transaction.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<rusqlite::Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open database: {path}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bundles (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                platform            TEXT NOT NULL,
                version             TEXT NOT NULL,
                min_app_version     TEXT NOT NULL,
                max_app_version     TEXT,
                rollout_percentage  INTEGER NOT NULL DEFAULT 100,
                status              TEXT NOT NULL DEFAULT 'draft',
                artifact_key        TEXT NOT NULL,
                hash                TEXT NOT NULL,
                size                INTEGER NOT NULL,
                created_at          TEXT NOT NULL,
                UNIQUE (platform, version)
            );

            CREATE INDEX IF NOT EXISTS idx_bundles_platform_status
                ON bundles(platform, status);

            CREATE TABLE IF NOT EXISTS update_logs (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                bundle_id      INTEGER NOT NULL,
                device_id      TEXT NOT NULL,
                status         TEXT NOT NULL,
                error_message  TEXT,
                timestamp      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_update_logs_bundle
                ON update_logs(bundle_id, timestamp DESC);",
        )
        .context("Failed to initialize database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn update_log_count(&self, bundle_id: i64) -> Result<u64> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM update_logs WHERE bundle_id = ?1",
            params![bundle_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(format!("database error: {err}"))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = bundlegate_core::Error>,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn bundle_from_row(row: &Row<'_>) -> rusqlite::Result<Bundle> {
    let platform: String = row.get(1)?;
    let version: String = row.get(2)?;
    let min_app_version: String = row.get(3)?;
    let max_app_version: Option<String> = row.get(4)?;
    let rollout: u32 = row.get(5)?;
    let status: String = row.get(6)?;

    Ok(Bundle {
        id: row.get(0)?,
        platform: parse_column::<Platform>(1, &platform)?,
        version: parse_column::<Version>(2, &version)?,
        min_app_version: parse_column::<Version>(3, &min_app_version)?,
        max_app_version: max_app_version
            .as_deref()
            .map(|v| parse_column::<Version>(4, v))
            .transpose()?,
        rollout_percentage: RolloutPercentage::new(rollout)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Integer, Box::new(e)))?,
        status: parse_column::<BundleStatus>(6, &status)?,
        artifact_key: row.get(7)?,
        hash: row.get(8)?,
        size: row.get(9)?,
        created_at: row.get::<_, DateTime<Utc>>(10)?,
    })
}

fn select_bundle(
    conn: &rusqlite::Connection,
    platform: Platform,
    version: &str,
) -> rusqlite::Result<Option<Bundle>> {
    conn.query_row(
        &format!("SELECT {BUNDLE_COLUMNS} FROM bundles WHERE platform = ?1 AND version = ?2"),
        params![platform.as_str(), version],
        bundle_from_row,
    )
    .optional()
}

impl BundleStore for Database {
    fn query(&self, filter: &BundleFilter) -> Result<Vec<Bundle>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BUNDLE_COLUMNS} FROM bundles
                 WHERE (?1 IS NULL OR platform = ?1) AND (?2 IS NULL OR status = ?2)
                 ORDER BY id"
            ))
            .map_err(unavailable)?;

        let rows = stmt
            .query_map(
                params![
                    filter.platform.map(Platform::as_str),
                    filter.status.map(BundleStatus::as_str)
                ],
                bundle_from_row,
            )
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;

        Ok(rows)
    }

    fn find(&self, platform: Platform, version: &Version) -> Result<Option<Bundle>, StoreError> {
        let conn = self.conn.lock();
        select_bundle(&conn, platform, &version.to_string()).map_err(unavailable)
    }

    fn insert(&self, bundle: &NewBundle) -> Result<Bundle, StoreError> {
        let conn = self.conn.lock();
        let draft = &bundle.draft;
        let version = draft.version.to_string();
        let now = Utc::now().to_rfc3339();

        let inserted = conn.execute(
            "INSERT INTO bundles (platform, version, min_app_version, max_app_version, rollout_percentage, status, artifact_key, hash, size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                draft.platform.as_str(),
                version,
                draft.min_app_version.to_string(),
                draft.max_app_version.as_ref().map(ToString::to_string),
                draft.rollout_percentage.value(),
                BundleStatus::Draft.as_str(),
                bundle.artifact_key,
                bundle.hash,
                bundle.size,
                now,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Duplicate {
                    platform: draft.platform,
                    version,
                });
            }
            Err(e) => return Err(unavailable(e)),
        }

        select_bundle(&conn, draft.platform, &version)
            .map_err(unavailable)?
            .ok_or_else(|| StoreError::Unavailable("inserted bundle vanished".to_owned()))
    }

    fn apply_status_changes(
        &self,
        platform: Platform,
        changes: &[StatusChange],
    ) -> Result<Vec<Bundle>, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;

        for change in changes {
            let version = change.version.to_string();
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM bundles WHERE platform = ?1 AND version = ?2",
                    params![platform.as_str(), version],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;

            let Some(current) = current else {
                return Err(StoreError::NotFound { platform, version });
            };
            let actual: BundleStatus = current
                .parse()
                .map_err(|e| StoreError::Unavailable(format!("corrupt status column: {e}")))?;
            if actual != change.expected {
                return Err(StoreError::PreconditionFailed {
                    platform,
                    version,
                    expected: change.expected,
                    actual,
                });
            }

            tx.execute(
                "UPDATE bundles SET status = ?1 WHERE platform = ?2 AND version = ?3",
                params![change.new.as_str(), platform.as_str(), version],
            )
            .map_err(unavailable)?;
        }

        let mut updated = Vec::with_capacity(changes.len());
        for change in changes {
            let version = change.version.to_string();
            let bundle = select_bundle(&tx, platform, &version)
                .map_err(unavailable)?
                .ok_or(StoreError::NotFound { platform, version })?;
            updated.push(bundle);
        }

        tx.commit().map_err(unavailable)?;
        Ok(updated)
    }

    fn append_update_log(&self, entry: &NewUpdateLog) -> Result<UpdateLog, StoreError> {
        let conn = self.conn.lock();
        let timestamp = Utc::now();
        conn.execute(
            "INSERT INTO update_logs (bundle_id, device_id, status, error_message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.bundle_id,
                entry.device_id,
                entry.status.as_str(),
                entry.error_message,
                timestamp.to_rfc3339(),
            ],
        )
        .map_err(unavailable)?;

        Ok(UpdateLog {
            id: conn.last_insert_rowid(),
            bundle_id: entry.bundle_id,
            device_id: entry.device_id.clone(),
            status: entry.status,
            error_message: entry.error_message.clone(),
            timestamp,
        })
    }
}
