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

//! Bundle and update-log records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub const ALL: [Self; 2] = [Self::Ios, Self::Android];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(Error::Validation(format!("unrecognized platform: {other:?}"))),
        }
    }
}

/// Publication state of a bundle.
///
/// `draft -> published -> deprecated`, plus `draft -> deprecated` for withdrawn
/// drafts and `deprecated -> published` which only rollback may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleStatus {
    Draft,
    Published,
    Deprecated,
}

impl BundleStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(Error::Validation(format!("unrecognized bundle status: {other:?}"))),
        }
    }
}

/// Share of eligible devices, in whole percent, that may receive a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RolloutPercentage(u8);

impl RolloutPercentage {
    pub const NONE: Self = Self(0);
    pub const FULL: Self = Self(100);

    pub fn new(value: u32) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or_else(|| {
                Error::Validation(format!("rollout percentage {value} outside [0, 100]"))
            })
    }

    /// Parse a user-supplied percentage such as `"25"`.
    pub fn parse(s: &str) -> Result<Self> {
        let value = s.trim().parse::<u32>().map_err(|_| {
            Error::Validation(format!("rollout percentage {s:?} is not an integer in [0, 100]"))
        })?;
        Self::new(value)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for RolloutPercentage {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Display for RolloutPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub id: i64,
    pub platform: Platform,
    pub version: Version,
    pub min_app_version: Version,
    pub max_app_version: Option<Version>,
    pub rollout_percentage: RolloutPercentage,
    pub status: BundleStatus,
    /// Location of the artifact in artifact storage; never handed to clients directly
    pub artifact_key: String,
    /// Content digest, verified by the client after download
    pub hash: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    /// Whether `app_version` lies inside the inclusive compatibility window.
    #[must_use]
    pub fn supports_app_version(&self, app_version: &Version) -> bool {
        if self.min_app_version.precedence_cmp(app_version).is_gt() {
            return false;
        }
        self.max_app_version
            .as_ref()
            .is_none_or(|max| max.precedence_cmp(app_version).is_ge())
    }
}

/// Validated bundle metadata, before an artifact has been stored for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDraft {
    pub platform: Platform,
    pub version: Version,
    pub min_app_version: Version,
    pub max_app_version: Option<Version>,
    pub rollout_percentage: RolloutPercentage,
}

impl BundleDraft {
    pub fn new(
        platform: Platform,
        version: Version,
        min_app_version: Version,
        max_app_version: Option<Version>,
        rollout_percentage: RolloutPercentage,
    ) -> Result<Self> {
        if let Some(max) = &max_app_version
            && max.precedence_cmp(&min_app_version).is_lt()
        {
            return Err(Error::Validation(format!(
                "maxAppVersion {max} is lower than minAppVersion {min_app_version}"
            )));
        }
        Ok(Self {
            platform,
            version,
            min_app_version,
            max_app_version,
            rollout_percentage,
        })
    }

    #[must_use]
    pub fn with_artifact(self, artifact_key: String, hash: String, size: u64) -> NewBundle {
        NewBundle {
            draft: self,
            artifact_key,
            hash,
            size,
        }
    }
}

/// A bundle ready to be inserted; always starts in [`BundleStatus::Draft`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBundle {
    pub draft: BundleDraft,
    pub artifact_key: String,
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOutcome {
    Success,
    Failure,
}

impl UpdateOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(Error::Validation(format!("unrecognized update status: {other:?}"))),
        }
    }
}

/// Append-only audit record of a client's update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLog {
    pub id: i64,
    /// Weak reference: never checked against the bundle set
    pub bundle_id: i64,
    pub device_id: String,
    pub status: UpdateOutcome,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpdateLog {
    pub bundle_id: i64,
    pub device_id: String,
    pub status: UpdateOutcome,
    pub error_message: Option<String>,
}

impl NewUpdateLog {
    pub fn new(
        bundle_id: i64,
        device_id: &str,
        status: UpdateOutcome,
        error_message: Option<String>,
    ) -> Result<Self> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(Error::Validation("deviceId must not be empty".to_owned()));
        }
        Ok(Self {
            bundle_id,
            device_id: device_id.to_owned(),
            status,
            error_message: error_message.filter(|m| !m.trim().is_empty()),
        })
    }
}
