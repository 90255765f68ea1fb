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

//! Candidate selection by compatibility window and version

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::model::{Bundle, BundleStatus, Platform};
use crate::store::{BundleFilter, BundleStore};
use crate::version::Version;

/// Pick the best update target from a snapshot of bundle records.
///
/// Survivors must be published, on `platform`, compatible with `app_version`
/// and strictly newer than `current_bundle_version` (absent means every
/// version qualifies). Several bundles may be published at once; the highest
/// version wins, compared by semantic-version precedence and then build
/// metadata, with the record id as the final tie-break.
#[must_use]
pub fn best_candidate<'a>(
    bundles: &'a [Bundle],
    platform: Platform,
    app_version: &Version,
    current_bundle_version: Option<&Version>,
) -> Option<&'a Bundle> {
    bundles
        .iter()
        .filter(|b| b.platform == platform && b.status == BundleStatus::Published)
        .filter(|b| b.supports_app_version(app_version))
        .filter(|b| current_bundle_version.is_none_or(|current| b.version.is_newer_than(current)))
        .max_by(|a, b| a.version.cmp(&b.version).then(a.id.cmp(&b.id)))
}

/// Reads published bundles from the store and applies [`best_candidate`].
#[derive(Clone)]
pub struct VersionMatcher {
    store: Arc<dyn BundleStore>,
}

impl std::fmt::Debug for VersionMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionMatcher").finish_non_exhaustive()
    }
}

impl VersionMatcher {
    pub fn new(store: Arc<dyn BundleStore>) -> Self {
        Self { store }
    }

    pub fn select_candidate(
        &self,
        platform: Platform,
        app_version: &Version,
        current_bundle_version: Option<&Version>,
    ) -> Result<Option<Bundle>> {
        let snapshot = self.store.query(&BundleFilter::published(platform))?;
        let candidate = best_candidate(&snapshot, platform, app_version, current_bundle_version);

        match candidate {
            Some(bundle) => debug!(
                %platform,
                %app_version,
                candidate = %bundle.version,
                "Selected update candidate"
            ),
            None => debug!(%platform, %app_version, "No compatible newer bundle"),
        }

        Ok(candidate.cloned())
    }
}
