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

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

const PLACEHOLDER_SECRET: &str = "change-me-to-a-strong-random-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Bearer token required by the administrative endpoints
    pub admin_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Externally reachable base URL of this server, used in download links
    pub public_base_url: String,
    pub signing_secret: String,
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
    #[serde(default = "default_max_bundle_bytes")]
    pub max_bundle_bytes: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "./data/bundlegate.db".to_owned()
}

fn default_storage_root() -> String {
    "./data/artifacts".to_owned()
}

fn default_url_ttl_secs() -> u64 {
    3600
}

fn default_max_bundle_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.auth.admin_token.is_empty() || self.auth.admin_token == PLACEHOLDER_SECRET {
            bail!("auth.admin_token must be set to a strong random value");
        }
        if self.storage.signing_secret.is_empty()
            || self.storage.signing_secret == PLACEHOLDER_SECRET
        {
            bail!("storage.signing_secret must be set to a strong random value");
        }
        if !self.storage.public_base_url.starts_with("http://")
            && !self.storage.public_base_url.starts_with("https://")
        {
            bail!("storage.public_base_url must be an http(s) URL");
        }
        if self.storage.url_ttl_secs == 0 {
            bail!("storage.url_ttl_secs must be greater than zero");
        }
        Ok(())
    }
}
