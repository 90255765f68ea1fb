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

pub mod admin;
pub mod artifacts;
pub mod config;
pub mod db;
pub mod error;
pub mod storage;
pub mod updates;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use bundlegate_core::{ArtifactStorage, BundleLifecycle, BundleStore, UpdateDecisionService};
use bundlegate_shared::bundle::HealthResponse;

use crate::config::ServerConfig;
use crate::storage::FilesystemStorage;

/// Headroom for multipart framing and the text fields around the bundle.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn BundleStore>,
    pub storage: Arc<FilesystemStorage>,
    pub lifecycle: BundleLifecycle,
    pub updates: UpdateDecisionService,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("storage", &self.storage)
            .field("lifecycle", &self.lifecycle)
            .field("updates", &self.updates)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, store: Arc<dyn BundleStore>) -> Self {
        let storage = Arc::new(FilesystemStorage::new(&config.storage));
        let artifacts: Arc<dyn ArtifactStorage> = storage.clone();
        Self {
            lifecycle: BundleLifecycle::new(Arc::clone(&store)),
            updates: UpdateDecisionService::new(Arc::clone(&store), artifacts),
            config,
            store,
            storage,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state
        .config
        .storage
        .max_bundle_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/bundles/check-for-updates",
            get(updates::check_for_updates_handler),
        )
        .route("/api/bundles/log-update", post(updates::log_update_handler))
        .route("/api/bundles", get(admin::list_bundles_handler))
        .route(
            "/api/bundles/upload",
            post(admin::upload_bundle_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/bundles/publish", post(admin::publish_handler))
        .route("/api/bundles/deprecate", post(admin::deprecate_handler))
        .route("/api/bundles/rollback", post(admin::rollback_handler))
        .route("/artifacts/{*key}", get(artifacts::download_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_owned(),
    })
}
