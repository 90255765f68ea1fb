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

//! In-process bundle store
//!
//! Keeps every record behind a single `RwLock`, so a status batch is applied
//! under one write guard and readers see either all of it or none of it.

use chrono::Utc;
use parking_lot::RwLock;

use crate::model::{Bundle, BundleStatus, NewBundle, NewUpdateLog, Platform, UpdateLog};
use crate::store::{BundleFilter, BundleStore, StatusChange, StoreError};
use crate::version::Version;

#[derive(Debug, Default)]
pub struct MemoryBundleStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    bundles: Vec<Bundle>,
    logs: Vec<UpdateLog>,
    next_bundle_id: i64,
    next_log_id: i64,
}

impl Inner {
    fn position(&self, platform: Platform, version: &Version) -> Option<usize> {
        self.bundles
            .iter()
            .position(|b| b.platform == platform && b.version == *version)
    }
}

impl MemoryBundleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn update_logs(&self) -> Vec<UpdateLog> {
        self.inner.read().logs.clone()
    }
}

impl BundleStore for MemoryBundleStore {
    fn query(&self, filter: &BundleFilter) -> Result<Vec<Bundle>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .bundles
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect())
    }

    fn find(&self, platform: Platform, version: &Version) -> Result<Option<Bundle>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .position(platform, version)
            .map(|idx| inner.bundles[idx].clone()))
    }

    fn insert(&self, bundle: &NewBundle) -> Result<Bundle, StoreError> {
        let mut inner = self.inner.write();
        let draft = &bundle.draft;
        if inner.position(draft.platform, &draft.version).is_some() {
            return Err(StoreError::Duplicate {
                platform: draft.platform,
                version: draft.version.to_string(),
            });
        }

        inner.next_bundle_id += 1;
        let record = Bundle {
            id: inner.next_bundle_id,
            platform: draft.platform,
            version: draft.version.clone(),
            min_app_version: draft.min_app_version.clone(),
            max_app_version: draft.max_app_version.clone(),
            rollout_percentage: draft.rollout_percentage,
            status: BundleStatus::Draft,
            artifact_key: bundle.artifact_key.clone(),
            hash: bundle.hash.clone(),
            size: bundle.size,
            created_at: Utc::now(),
        };
        inner.bundles.push(record.clone());
        Ok(record)
    }

    fn apply_status_changes(
        &self,
        platform: Platform,
        changes: &[StatusChange],
    ) -> Result<Vec<Bundle>, StoreError> {
        let mut inner = self.inner.write();

        // Validate the whole batch before touching anything
        let mut positions = Vec::with_capacity(changes.len());
        for change in changes {
            let idx =
                inner
                    .position(platform, &change.version)
                    .ok_or_else(|| StoreError::NotFound {
                        platform,
                        version: change.version.to_string(),
                    })?;
            let actual = inner.bundles[idx].status;
            if actual != change.expected {
                return Err(StoreError::PreconditionFailed {
                    platform,
                    version: change.version.to_string(),
                    expected: change.expected,
                    actual,
                });
            }
            positions.push(idx);
        }

        let mut updated = Vec::with_capacity(changes.len());
        for (idx, change) in positions.into_iter().zip(changes) {
            inner.bundles[idx].status = change.new;
            updated.push(inner.bundles[idx].clone());
        }
        Ok(updated)
    }

    fn append_update_log(&self, entry: &NewUpdateLog) -> Result<UpdateLog, StoreError> {
        let mut inner = self.inner.write();
        inner.next_log_id += 1;
        let log = UpdateLog {
            id: inner.next_log_id,
            bundle_id: entry.bundle_id,
            device_id: entry.device_id.clone(),
            status: entry.status,
            error_message: entry.error_message.clone(),
            timestamp: Utc::now(),
        };
        inner.logs.push(log.clone());
        Ok(log)
    }
}
