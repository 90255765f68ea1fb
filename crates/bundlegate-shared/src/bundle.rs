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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BundleRecord {
    pub id: i64,
    pub version: String,
    pub platform: String,
    pub min_app_version: String,
    #[serde(default)]
    pub max_app_version: Option<String>,
    pub rollout_percentage: u8,
    pub status: String,
    pub artifact_key: String,
    pub hash: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Body of the publish, deprecate and rollback endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleRequest {
    pub version: String,
    pub platform: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RollbackResponse {
    pub message: String,
    pub deprecated: BundleRecord,
    pub reactivated: Option<BundleRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BundleListQuery {
    pub platform: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}
