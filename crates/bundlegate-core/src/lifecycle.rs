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

//! Bundle publication lifecycle: publish, deprecate, rollback

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{Bundle, BundleStatus, Platform};
use crate::store::{BundleFilter, BundleStore, StatusChange};
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// The rolled-back bundle, now deprecated
    pub deprecated: Bundle,
    /// Highest deprecated predecessor, published again. `None` leaves the
    /// platform without a published successor until a new bundle is published.
    pub reactivated: Option<Bundle>,
}

/// The only writer of bundle status.
///
/// Every transition is computed from a snapshot and submitted as one
/// compare-and-set batch, so a concurrent writer turns into
/// [`Error::Conflict`] instead of an interleaved result.
#[derive(Clone)]
pub struct BundleLifecycle {
    store: Arc<dyn BundleStore>,
}

impl std::fmt::Debug for BundleLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleLifecycle").finish_non_exhaustive()
    }
}

impl BundleLifecycle {
    pub fn new(store: Arc<dyn BundleStore>) -> Self {
        Self { store }
    }

    /// `draft -> published`. Other published bundles are left as they are.
    /// Publishing an already published bundle is a no-op.
    pub fn publish(&self, platform: Platform, version: &Version) -> Result<Bundle> {
        let bundle = self.require(platform, version)?;
        match bundle.status {
            BundleStatus::Published => return Ok(bundle),
            BundleStatus::Deprecated => {
                return Err(Error::InvalidTransition {
                    from: BundleStatus::Deprecated,
                    to: BundleStatus::Published,
                });
            }
            BundleStatus::Draft => {}
        }

        let published = self.apply_one(platform, version, bundle.status, BundleStatus::Published)?;
        info!(
            %platform,
            version = %published.version,
            rollout = %published.rollout_percentage,
            "Bundle published"
        );
        Ok(published)
    }

    /// `draft | published -> deprecated`. Deprecating twice is a no-op.
    pub fn deprecate(&self, platform: Platform, version: &Version) -> Result<Bundle> {
        let bundle = self.require(platform, version)?;
        if bundle.status == BundleStatus::Deprecated {
            return Ok(bundle);
        }

        let deprecated =
            self.apply_one(platform, version, bundle.status, BundleStatus::Deprecated)?;
        info!(%platform, version = %deprecated.version, "Bundle deprecated");
        Ok(deprecated)
    }

    /// Deprecate `version` and re-publish its highest deprecated predecessor,
    /// both in one atomic batch.
    pub fn rollback(&self, platform: Platform, version: &Version) -> Result<RollbackOutcome> {
        let snapshot = self.store.query(&BundleFilter::for_platform(platform))?;

        let target = snapshot
            .iter()
            .find(|b| b.version == *version)
            .ok_or_else(|| Error::NotFound {
                platform,
                version: version.to_string(),
            })?;

        let predecessor = snapshot
            .iter()
            .filter(|b| {
                b.status == BundleStatus::Deprecated && b.version.precedence_cmp(version).is_lt()
            })
            .max_by(|a, b| a.version.cmp(&b.version).then(a.id.cmp(&b.id)));

        let mut changes = vec![StatusChange {
            version: target.version.clone(),
            expected: target.status,
            new: BundleStatus::Deprecated,
        }];
        if let Some(prev) = predecessor {
            changes.push(StatusChange {
                version: prev.version.clone(),
                expected: BundleStatus::Deprecated,
                new: BundleStatus::Published,
            });
        }

        let mut updated = self.store.apply_status_changes(platform, &changes)?.into_iter();
        let deprecated = updated.next().ok_or_else(|| {
            Error::StoreUnavailable("store returned no record for rollback target".to_owned())
        })?;
        let reactivated = updated.next();

        match &reactivated {
            Some(prev) => info!(
                %platform,
                from = %deprecated.version,
                to = %prev.version,
                "Rolled back bundle"
            ),
            None => warn!(
                %platform,
                from = %deprecated.version,
                "Rolled back bundle with no deprecated predecessor; platform has no successor"
            ),
        }

        Ok(RollbackOutcome {
            deprecated,
            reactivated,
        })
    }

    fn require(&self, platform: Platform, version: &Version) -> Result<Bundle> {
        self.store
            .find(platform, version)?
            .ok_or_else(|| Error::NotFound {
                platform,
                version: version.to_string(),
            })
    }

    fn apply_one(
        &self,
        platform: Platform,
        version: &Version,
        expected: BundleStatus,
        new: BundleStatus,
    ) -> Result<Bundle> {
        let change = StatusChange {
            version: version.clone(),
            expected,
            new,
        };
        self.store
            .apply_status_changes(platform, &[change])?
            .pop()
            .ok_or_else(|| {
                Error::StoreUnavailable(format!("store returned no record for {platform} {version}"))
            })
    }
}
