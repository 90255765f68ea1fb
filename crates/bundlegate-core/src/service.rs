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

//! Update decision: version matching followed by the rollout gate

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::matcher::VersionMatcher;
use crate::model::Platform;
use crate::rollout::is_device_included;
use crate::store::{ArtifactStorage, BundleStore};
use crate::version::{Version, parse_optional_version, parse_version};

/// A validated update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub platform: Platform,
    pub app_version: Version,
    pub current_bundle_version: Option<Version>,
    pub device_id: String,
}

impl CheckRequest {
    /// Validate raw client input. Nothing is coerced: an unknown platform,
    /// a malformed version or a blank device id is a validation error.
    pub fn parse(
        platform: &str,
        app_version: &str,
        current_bundle_version: Option<&str>,
        device_id: &str,
    ) -> Result<Self> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(Error::Validation("deviceId must not be empty".to_owned()));
        }
        Ok(Self {
            platform: platform.parse()?,
            app_version: parse_version(app_version)?,
            current_bundle_version: parse_optional_version(current_bundle_version)?,
            device_id: device_id.to_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOffer {
    pub bundle_id: i64,
    pub version: Version,
    pub download_url: String,
    pub hash: String,
    pub size: u64,
}

/// Outcome of an update check. Rollout exclusion and "nothing newer" are
/// deliberately the same `NoUpdate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    UpdateAvailable(UpdateOffer),
    NoUpdate,
}

#[derive(Clone)]
pub struct UpdateDecisionService {
    matcher: VersionMatcher,
    storage: Arc<dyn ArtifactStorage>,
}

impl std::fmt::Debug for UpdateDecisionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateDecisionService")
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl UpdateDecisionService {
    pub fn new(store: Arc<dyn BundleStore>, storage: Arc<dyn ArtifactStorage>) -> Self {
        Self {
            matcher: VersionMatcher::new(store),
            storage,
        }
    }

    pub async fn check_for_update(&self, request: &CheckRequest) -> Result<UpdateDecision> {
        let Some(candidate) = self.matcher.select_candidate(
            request.platform,
            &request.app_version,
            request.current_bundle_version.as_ref(),
        )?
        else {
            return Ok(UpdateDecision::NoUpdate);
        };

        if !is_device_included(
            &request.device_id,
            &candidate.version,
            candidate.rollout_percentage,
        ) {
            debug!(
                platform = %request.platform,
                version = %candidate.version,
                rollout = %candidate.rollout_percentage,
                "Device outside rollout"
            );
            return Ok(UpdateDecision::NoUpdate);
        }

        let download_url = self
            .storage
            .temporary_download_url(&candidate.artifact_key)
            .await?;

        Ok(UpdateDecision::UpdateAvailable(UpdateOffer {
            bundle_id: candidate.id,
            version: candidate.version,
            download_url,
            hash: candidate.hash,
            size: candidate.size,
        }))
    }
}
