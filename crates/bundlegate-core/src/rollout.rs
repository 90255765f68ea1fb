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

//! Deterministic staged rollout
//!
//! A device's position in a rollout is derived from
//! `SHA-256(device_id || bundle_version)`: the first four digest bytes, read as a
//! big-endian `u32`, scaled onto `[0, 100)`. Nothing is stored per device, and
//! hashing the bundle version in re-shuffles devices for every new bundle.

use sha2::{Digest, Sha256};

use crate::model::RolloutPercentage;
use crate::version::Version;

const BUCKET_SPACE: f64 = 4_294_967_296.0;

/// Raw 32-bit bucket for a device and bundle version.
#[must_use]
pub fn device_bucket(device_id: &str, bundle_version: &Version) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(device_id.as_bytes());
    hasher.update(bundle_version.to_string().as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// The device's percentile in `[0, 100)`, useful when debugging support cases.
#[must_use]
pub fn device_percentile(device_id: &str, bundle_version: &Version) -> f64 {
    f64::from(device_bucket(device_id, bundle_version)) / BUCKET_SPACE * 100.0
}

/// Whether the device falls inside the rollout.
///
/// Included iff `percentile <= percentage`, evaluated in integer arithmetic so
/// 100 admits every device exactly. 0 admits none.
#[must_use]
pub fn is_device_included(
    device_id: &str,
    bundle_version: &Version,
    percentage: RolloutPercentage,
) -> bool {
    if percentage == RolloutPercentage::NONE {
        return false;
    }
    let bucket = u64::from(device_bucket(device_id, bundle_version));
    bucket * 100 <= u64::from(percentage.value()) << 32
}
