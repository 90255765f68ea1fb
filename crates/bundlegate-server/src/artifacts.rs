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

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::AppState;
use crate::error::ApiError;
use crate::storage::LinkRejection;

#[derive(Debug, Deserialize)]
pub struct SignedLinkQuery {
    pub expires: i64,
    pub signature: String,
}

/// `GET /artifacts/{*key}?expires=&signature=`
pub async fn download_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    query: Result<Query<SignedLinkQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(link) = query
        .map_err(|_| ApiError::Forbidden("Download link is missing its signature".to_owned()))?;

    if let Err(rejection) =
        state
            .storage
            .verify_link(&key, link.expires, &link.signature, Utc::now().timestamp())
    {
        warn!(key = %key, ?rejection, "Download link refused");
        let message = match rejection {
            LinkRejection::Expired => "Download link has expired",
            LinkRejection::BadSignature | LinkRejection::BadKey => "Invalid download link",
        };
        return Err(ApiError::Forbidden(message.to_owned()));
    }

    let (file, len) = state
        .storage
        .open(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No artifact stored under {key}")))?;

    Ok((
        [
            (CONTENT_TYPE, "application/javascript".to_owned()),
            (CONTENT_LENGTH, len.to_string()),
            (CACHE_CONTROL, "private, max-age=0".to_owned()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}
