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
use axum::extract::{Multipart, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use bundlegate_core::version::parse_optional_version;
use bundlegate_core::{
    ArtifactMetadata, ArtifactStorage, Bundle, BundleDraft, BundleFilter, Error, Platform,
    RolloutPercentage, Version, parse_version,
};
use bundlegate_shared::bundle::{
    BundleListQuery, BundleRecord, LifecycleRequest, RollbackResponse,
};

use crate::AppState;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

#[must_use]
pub fn bundle_record(bundle: &Bundle) -> BundleRecord {
    BundleRecord {
        id: bundle.id,
        version: bundle.version.to_string(),
        platform: bundle.platform.to_string(),
        min_app_version: bundle.min_app_version.to_string(),
        max_app_version: bundle.max_app_version.as_ref().map(ToString::to_string),
        rollout_percentage: bundle.rollout_percentage.value(),
        status: bundle.status.to_string(),
        artifact_key: bundle.artifact_key.clone(),
        hash: bundle.hash.clone(),
        size: bundle.size,
        created_at: bundle.created_at,
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim());
    match token {
        Some(token) if token_matches(token, &state.config.auth.admin_token) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Constant-time token comparison: both sides are reduced to fixed-length
/// HMAC tags and the tags are compared with `verify_slice`.
fn token_matches(provided: &str, expected: &str) -> bool {
    let tag = |key: &str| {
        HmacSha256::new_from_slice(key.as_bytes()).map(|mut mac| {
            mac.update(b"bundlegate-admin");
            mac
        })
    };
    match (tag(provided), tag(expected)) {
        (Ok(provided), Ok(expected)) => provided
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

fn parse_target(request: &LifecycleRequest) -> Result<(Platform, Version), ApiError> {
    Ok((request.platform.parse()?, parse_version(&request.version)?))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "{name} must be true or false, got {other:?}"
        ))),
    }
}

#[derive(Debug, Default)]
struct UploadForm {
    version: Option<String>,
    platform: Option<String>,
    min_app_version: Option<String>,
    max_app_version: Option<String>,
    rollout_percentage: Option<String>,
    publish: Option<String>,
    bundle: Option<Vec<u8>>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart, max_bundle_bytes: usize) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            match name.as_str() {
                "bundle" => {
                    let bytes = field.bytes().await?;
                    if bytes.len() > max_bundle_bytes {
                        return Err(ApiError::PayloadTooLarge(max_bundle_bytes));
                    }
                    form.bundle = Some(bytes.to_vec());
                }
                "version" => form.version = Some(field.text().await?),
                "platform" => form.platform = Some(field.text().await?),
                "minAppVersion" => form.min_app_version = Some(field.text().await?),
                "maxAppVersion" => form.max_app_version = Some(field.text().await?),
                "rolloutPercentage" => form.rollout_percentage = Some(field.text().await?),
                "publish" => form.publish = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }
}

fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
}

/// Remove a freshly stored artifact after its bundle record could not be
/// inserted, unless a concurrent upload of the same bytes now owns the key.
async fn discard_unreferenced_artifact(state: &AppState, platform: Platform, location_key: &str) {
    let referenced = state
        .store
        .query(&BundleFilter::for_platform(platform))
        .map(|bundles| bundles.iter().any(|b| b.artifact_key == location_key));
    match referenced {
        Ok(false) => {
            if let Err(e) = state.storage.remove(location_key).await {
                warn!(key = %location_key, error = %e, "Failed to remove orphaned artifact");
            }
        }
        Ok(true) => {}
        Err(e) => warn!(
            key = %location_key,
            error = %e,
            "Could not check artifact references, leaving file in place"
        ),
    }
}

/// `POST /api/bundles/upload` (multipart)
///
/// Stores the artifact, records the bundle as a draft and publishes it unless
/// `publish=false` was sent.
pub async fn upload_bundle_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<BundleRecord>), ApiError> {
    require_admin(&state, &headers)?;
    let form = UploadForm::read(multipart, state.config.storage.max_bundle_bytes).await?;

    let platform: Platform = required(form.platform.as_ref(), "platform")?.parse()?;
    let version = parse_version(required(form.version.as_ref(), "version")?)?;
    let min_app_version = parse_version(required(form.min_app_version.as_ref(), "minAppVersion")?)?;
    let max_app_version = parse_optional_version(form.max_app_version.as_deref())?;
    let rollout_percentage = match form.rollout_percentage.as_deref().map(str::trim) {
        None | Some("") => RolloutPercentage::default(),
        Some(raw) => RolloutPercentage::parse(raw)?,
    };
    let publish = match form.publish.as_deref() {
        None => true,
        Some(raw) => parse_flag("publish", raw)?,
    };
    let bytes = form
        .bundle
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No bundle file provided".to_owned()))?;

    let draft = BundleDraft::new(
        platform,
        version,
        min_app_version,
        max_app_version,
        rollout_percentage,
    )?;

    if state
        .store
        .find(platform, &draft.version)
        .map_err(Error::from)?
        .is_some()
    {
        return Err(Error::Conflict(format!(
            "bundle already exists: {platform} {}",
            draft.version
        ))
        .into());
    }

    let stored = state
        .storage
        .store(
            &bytes,
            &ArtifactMetadata {
                platform,
                version: draft.version.clone(),
            },
        )
        .await?;

    let location_key = stored.location_key.clone();
    let inserted = state.store.insert(&draft.with_artifact(
        stored.location_key,
        stored.content_hash,
        stored.size,
    ));
    let mut bundle = match inserted {
        Ok(bundle) => bundle,
        Err(e) => {
            discard_unreferenced_artifact(&state, platform, &location_key).await;
            return Err(Error::from(e).into());
        }
    };
    info!(
        platform = %bundle.platform,
        version = %bundle.version,
        size = bundle.size,
        rollout = %bundle.rollout_percentage,
        "Bundle uploaded"
    );

    if publish {
        match state.lifecycle.publish(platform, &bundle.version) {
            Ok(published) => bundle = published,
            // The draft is recorded; the caller sees status "draft" and can
            // publish it through /api/bundles/publish.
            Err(e) => warn!(
                platform = %platform,
                version = %bundle.version,
                error = %e,
                "Bundle stored as draft, publishing failed"
            ),
        }
    }

    Ok((StatusCode::CREATED, Json(bundle_record(&bundle))))
}

/// `POST /api/bundles/publish`
#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn publish_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LifecycleRequest>, JsonRejection>,
) -> Result<Json<BundleRecord>, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (platform, version) = parse_target(&body)?;
    let bundle = state.lifecycle.publish(platform, &version)?;
    Ok(Json(bundle_record(&bundle)))
}

/// `POST /api/bundles/deprecate`
#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn deprecate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LifecycleRequest>, JsonRejection>,
) -> Result<Json<BundleRecord>, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (platform, version) = parse_target(&body)?;
    let bundle = state.lifecycle.deprecate(platform, &version)?;
    Ok(Json(bundle_record(&bundle)))
}

/// `POST /api/bundles/rollback`
#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn rollback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LifecycleRequest>, JsonRejection>,
) -> Result<Json<RollbackResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (platform, version) = parse_target(&body)?;
    let outcome = state.lifecycle.rollback(platform, &version)?;

    Ok(Json(RollbackResponse {
        message: "Rollback successful".to_owned(),
        deprecated: bundle_record(&outcome.deprecated),
        reactivated: outcome.reactivated.as_ref().map(bundle_record),
    }))
}

/// `GET /api/bundles?platform=`, newest version first.
#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn list_bundles_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<BundleListQuery>, QueryRejection>,
) -> Result<Json<Vec<BundleRecord>>, ApiError> {
    require_admin(&state, &headers)?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let platform: Platform = query.platform.parse()?;

    let mut bundles = state
        .store
        .query(&BundleFilter::for_platform(platform))
        .map_err(Error::from)?;
    bundles.sort_by(|a, b| b.version.cmp(&a.version));

    Ok(Json(bundles.iter().map(bundle_record).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("publish", "true").unwrap());
        assert!(!parse_flag("publish", " 0 ").unwrap());
        assert!(matches!(
            parse_flag("publish", "yes"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("s3cret-admin", "s3cret-admin"));
        assert!(!token_matches("s3cret-admin", "s3cret-admiN"));
        assert!(!token_matches("s3cret", "s3cret-admin"));
        assert!(!token_matches("", "s3cret-admin"));
    }

    #[test]
    fn test_required_rejects_blank() {
        let blank = Some("  ".to_owned());
        assert!(required(blank.as_ref(), "version").is_err());
        assert!(required(None, "version").is_err());
        let value = Some("1.0.0".to_owned());
        assert_eq!(required(value.as_ref(), "version").unwrap(), "1.0.0");
    }
}
