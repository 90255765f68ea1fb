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

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use bundlegate_core::store::{ArtifactMetadata, ArtifactStorage, StoredArtifact};
use bundlegate_core::{Error, Result};

use crate::config::StorageSettings;

type HmacSha256 = Hmac<Sha256>;

/// Why a download link was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRejection {
    Expired,
    BadSignature,
    BadKey,
}

/// Content-addressed bundle files on local disk, served back through
/// HMAC-signed links that expire.
pub struct FilesystemStorage {
    root: PathBuf,
    public_base_url: String,
    signing_secret: Vec<u8>,
    url_ttl_secs: i64,
}

impl std::fmt::Debug for FilesystemStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemStorage")
            .field("root", &self.root)
            .field("public_base_url", &self.public_base_url)
            .field("url_ttl_secs", &self.url_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl FilesystemStorage {
    #[must_use]
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            root: PathBuf::from(&settings.root),
            public_base_url: settings.public_base_url.trim_end_matches('/').to_owned(),
            signing_secret: settings.signing_secret.as_bytes().to_vec(),
            url_ttl_secs: i64::try_from(settings.url_ttl_secs).unwrap_or(i64::MAX),
        }
    }

    fn mac(&self, artifact_key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_secret)
            .map_err(|e| Error::Storage(format!("invalid signing key: {e}")))?;
        mac.update(artifact_key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Hex signature over `"{key}\n{expires}"`.
    pub fn sign(&self, artifact_key: &str, expires: i64) -> Result<String> {
        Ok(hex::encode(self.mac(artifact_key, expires)?.finalize().into_bytes()))
    }

    pub fn signed_url(&self, artifact_key: &str, expires: i64) -> Result<String> {
        let signature = self.sign(artifact_key, expires)?;
        Ok(format!(
            "{}/artifacts/{artifact_key}?expires={expires}&signature={signature}",
            self.public_base_url
        ))
    }

    /// Check a download link at time `now` (unix seconds).
    pub fn verify_link(
        &self,
        artifact_key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> std::result::Result<(), LinkRejection> {
        if resolve_key(&self.root, artifact_key).is_none() {
            return Err(LinkRejection::BadKey);
        }
        let provided = hex::decode(signature).map_err(|_| LinkRejection::BadSignature)?;
        self.mac(artifact_key, expires)
            .map_err(|_| LinkRejection::BadSignature)?
            .verify_slice(&provided)
            .map_err(|_| LinkRejection::BadSignature)?;
        if expires < now {
            return Err(LinkRejection::Expired);
        }
        Ok(())
    }

    /// Open the artifact for streaming, with its length. `None` when nothing
    /// is stored under the key.
    pub async fn open(&self, artifact_key: &str) -> Result<Option<(tokio::fs::File, u64)>> {
        let Some(path) = resolve_key(&self.root, artifact_key) else {
            return Ok(None);
        };
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "failed to open {}: {e}",
                    path.display()
                )));
            }
        };
        let metadata = file
            .metadata()
            .await
            .map_err(|e| Error::Storage(format!("failed to stat {}: {e}", path.display())))?;
        Ok(Some((file, metadata.len())))
    }

    /// Remove an artifact that no bundle record points to.
    pub async fn remove(&self, artifact_key: &str) -> Result<()> {
        let Some(path) = resolve_key(&self.root, artifact_key) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Map a storage key onto a path below `root`. Keys that are absolute or
/// that climb out of the root resolve to nothing.
fn resolve_key(root: &Path, artifact_key: &str) -> Option<PathBuf> {
    let relative = Path::new(artifact_key);
    if artifact_key.is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

#[async_trait]
impl ArtifactStorage for FilesystemStorage {
    async fn store(&self, bytes: &[u8], metadata: &ArtifactMetadata) -> Result<StoredArtifact> {
        let content_hash = format!("{:x}", Sha256::digest(bytes));
        let location_key = format!(
            "bundles/{}/{}/{content_hash}.jsbundle",
            metadata.platform, metadata.version
        );
        let path = resolve_key(&self.root, &location_key)
            .ok_or_else(|| Error::Storage(format!("unsafe artifact key: {location_key}")))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        // Readers only ever see a complete file.
        let partial = path.with_extension("jsbundle.partial");
        tokio::fs::write(&partial, bytes)
            .await
            .map_err(|e| Error::Storage(format!("failed to write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| Error::Storage(format!("failed to move {}: {e}", path.display())))?;

        info!(key = %location_key, size = bytes.len(), "Stored bundle artifact");

        Ok(StoredArtifact {
            location_key,
            content_hash,
            size: bytes.len() as u64,
        })
    }

    async fn temporary_download_url(&self, artifact_key: &str) -> Result<String> {
        let expires = Utc::now().timestamp().saturating_add(self.url_ttl_secs);
        debug!(key = %artifact_key, expires, "Signing download URL");
        self.signed_url(artifact_key, expires)
    }
}
