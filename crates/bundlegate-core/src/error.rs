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

//! Error types for the core crate

use thiserror::Error;

use crate::model::{BundleStatus, Platform};

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any matching or rollout logic runs
    #[error("validation error: {0}")]
    Validation(String),

    #[error("bundle not found: {platform} {version}")]
    NotFound { platform: Platform, version: String },

    /// A concurrent writer changed the bundle set; the caller may retry
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: BundleStatus,
        to: BundleStatus,
    },

    #[error("bundle store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("artifact storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for failures where the outcome could not be determined at all,
    /// as opposed to a definite answer such as "not found".
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
