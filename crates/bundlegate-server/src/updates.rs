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

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use bundlegate_core::{CheckRequest, NewUpdateLog, UpdateDecision, UpdateOutcome};
use bundlegate_shared::update::{
    CheckForUpdatesQuery, LogUpdateRequest, UpdateAvailableResponse, UpdateLogRecord,
};

use crate::AppState;
use crate::error::ApiError;

/// `GET /api/bundles/check-for-updates`
///
/// 200 with the offer when an update applies to this device, 204 otherwise.
pub async fn check_for_updates_handler(
    State(state): State<AppState>,
    query: Result<Query<CheckForUpdatesQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = CheckRequest::parse(
        &query.platform,
        &query.app_version,
        query.current_bundle_version.as_deref(),
        &query.device_id,
    )?;

    match state.updates.check_for_update(&request).await? {
        UpdateDecision::UpdateAvailable(offer) => {
            debug!(
                platform = %request.platform,
                version = %offer.version,
                device_id = %request.device_id,
                "Offering update"
            );
            Ok(Json(UpdateAvailableResponse {
                update_available: true,
                version: offer.version.to_string(),
                download_url: offer.download_url,
                hash: offer.hash,
                size: offer.size,
            })
            .into_response())
        }
        UpdateDecision::NoUpdate => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// `POST /api/bundles/log-update`
#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn log_update_handler(
    State(state): State<AppState>,
    body: Result<Json<LogUpdateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UpdateLogRecord>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let status: UpdateOutcome = body.status.parse()?;
    let entry = NewUpdateLog::new(body.bundle_id, &body.device_id, status, body.error_message)?;

    let log = state
        .store
        .append_update_log(&entry)
        .map_err(bundlegate_core::Error::from)?;
    info!(
        bundle_id = log.bundle_id,
        device_id = %log.device_id,
        status = %log.status,
        "Update outcome recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UpdateLogRecord {
            id: log.id,
            bundle_id: log.bundle_id,
            device_id: log.device_id,
            status: log.status.to_string(),
            error_message: log.error_message,
            timestamp: log.timestamp,
        }),
    ))
}
