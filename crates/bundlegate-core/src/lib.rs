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

//! BundleGate core - update resolution for over-the-air code bundles
//!
//! Decides whether a client (platform, host app version, current bundle version,
//! device identifier) should receive a newer bundle, gates the decision behind a
//! deterministic staged rollout, and governs the publish/deprecate/rollback
//! lifecycle of bundles. Persistence and artifact storage are reached through the
//! [`store::BundleStore`] and [`store::ArtifactStorage`] traits.

pub mod error;
pub mod lifecycle;
pub mod matcher;
pub mod memory;
pub mod model;
pub mod rollout;
pub mod service;
pub mod store;
pub mod version;

pub use error::{Error, Result};
pub use lifecycle::{BundleLifecycle, RollbackOutcome};
pub use matcher::{VersionMatcher, best_candidate};
pub use memory::MemoryBundleStore;
pub use model::{
    Bundle, BundleDraft, BundleStatus, NewBundle, NewUpdateLog, Platform, RolloutPercentage,
    UpdateLog, UpdateOutcome,
};
pub use rollout::{device_percentile, is_device_included};
pub use service::{CheckRequest, UpdateDecision, UpdateDecisionService, UpdateOffer};
pub use store::{
    ArtifactMetadata, ArtifactStorage, BundleFilter, BundleStore, StatusChange, StoreError,
    StoredArtifact,
};
pub use version::{Version, parse_version};
