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

//! Collaborator interfaces: the bundle store and artifact storage

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::model::{Bundle, BundleStatus, NewBundle, NewUpdateLog, Platform, UpdateLog};
use crate::version::Version;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bundle not found: {platform} {version}")]
    NotFound { platform: Platform, version: String },

    #[error("bundle already exists: {platform} {version}")]
    Duplicate { platform: Platform, version: String },

    #[error("status of {platform} {version} is {actual}, expected {expected}")]
    PreconditionFailed {
        platform: Platform,
        version: String,
        expected: BundleStatus,
        actual: BundleStatus,
    },

    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { platform, version } => Self::NotFound { platform, version },
            e @ (StoreError::Duplicate { .. } | StoreError::PreconditionFailed { .. }) => {
                Self::Conflict(e.to_string())
            }
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
        }
    }
}

/// Row filter for [`BundleStore::query`]; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleFilter {
    pub platform: Option<Platform>,
    pub status: Option<BundleStatus>,
}

impl BundleFilter {
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform: Some(platform),
            status: None,
        }
    }

    #[must_use]
    pub fn published(platform: Platform) -> Self {
        Self {
            platform: Some(platform),
            status: Some(BundleStatus::Published),
        }
    }

    #[must_use]
    pub fn matches(&self, bundle: &Bundle) -> bool {
        self.platform.is_none_or(|p| p == bundle.platform)
            && self.status.is_none_or(|s| s == bundle.status)
    }
}

/// Compare-and-set of a single bundle's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub version: Version,
    pub expected: BundleStatus,
    pub new: BundleStatus,
}

/// Durable bundle and update-log records.
///
/// Only [`crate::BundleLifecycle`] writes bundle status, and it does so
/// exclusively through [`BundleStore::apply_status_changes`].
pub trait BundleStore: Send + Sync {
    fn query(&self, filter: &BundleFilter) -> std::result::Result<Vec<Bundle>, StoreError>;

    fn find(
        &self,
        platform: Platform,
        version: &Version,
    ) -> std::result::Result<Option<Bundle>, StoreError>;

    /// Insert a new bundle in draft status. Fails with `Duplicate` when the
    /// (platform, version) pair is taken.
    fn insert(&self, bundle: &NewBundle) -> std::result::Result<Bundle, StoreError>;

    /// Apply every change or none of them.
    ///
    /// A missing bundle yields `NotFound`; a bundle whose current status differs
    /// from `expected` yields `PreconditionFailed`. In both cases nothing is
    /// written, and readers never observe a partially applied batch. Returns
    /// the updated bundles in the order of `changes`.
    fn apply_status_changes(
        &self,
        platform: Platform,
        changes: &[StatusChange],
    ) -> std::result::Result<Vec<Bundle>, StoreError>;

    fn append_update_log(&self, entry: &NewUpdateLog)
    -> std::result::Result<UpdateLog, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub platform: Platform,
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub location_key: String,
    /// Hex-encoded SHA-256 of the stored bytes
    pub content_hash: String,
    pub size: u64,
}

/// Binary artifact storage. Failures are reported as [`Error::Storage`].
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn store(&self, bytes: &[u8], metadata: &ArtifactMetadata) -> Result<StoredArtifact>;

    /// A download URL for `artifact_key` that stops working after a bounded time.
    async fn temporary_download_url(&self, artifact_key: &str) -> Result<String>;
}
