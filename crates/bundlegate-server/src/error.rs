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
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use bundlegate_core::Error;
use bundlegate_shared::bundle::ErrorResponse;

/// Error type returned by every handler; rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    PayloadTooLarge(usize),
    Multipart(MultipartError),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Multipart(err)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(err) => match err {
                Error::Validation(_) => StatusCode::BAD_REQUEST,
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::Conflict(_) | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
                Error::StoreUnavailable(_) | Error::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Multipart(err) => err.status(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Core(err) => err.to_string(),
            Self::BadRequest(msg) | Self::Forbidden(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Unauthorized => "Missing or invalid admin token".to_owned(),
            Self::PayloadTooLarge(limit) => format!("Bundle exceeds the {limit} byte limit"),
            Self::Multipart(err) => err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlegate_core::{BundleStatus, Platform};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Validation("bad".to_owned()), StatusCode::BAD_REQUEST),
            (
                Error::NotFound {
                    platform: Platform::Ios,
                    version: "1.0.0".to_owned(),
                },
                StatusCode::NOT_FOUND,
            ),
            (Error::Conflict("race".to_owned()), StatusCode::CONFLICT),
            (
                Error::InvalidTransition {
                    from: BundleStatus::Deprecated,
                    to: BundleStatus::Published,
                },
                StatusCode::CONFLICT,
            ),
            (
                Error::StoreUnavailable("locked".to_owned()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (Error::Storage("disk".to_owned()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::PayloadTooLarge(10).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
