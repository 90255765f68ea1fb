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

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use serde_json::json;
use tempfile::TempDir;

use bundlegate_core::{
    Bundle, BundleFilter, BundleStore, NewBundle, NewUpdateLog, Platform, RolloutPercentage,
    StatusChange, StoreError, UpdateLog, Version, is_device_included, parse_version,
};
use bundlegate_server::config::{
    AuthSettings, DatabaseSettings, ServerConfig, ServerSettings, StorageSettings,
};
use bundlegate_server::db::Database;
use bundlegate_server::storage::FilesystemStorage;
use bundlegate_server::{AppState, build_router};

const ADMIN_TOKEN: &str = "test-admin-token";

fn test_config(port: u16, artifacts: &TempDir) -> ServerConfig {
    ServerConfig {
        server: ServerSettings {
            bind_address: "127.0.0.1".to_owned(),
            port,
        },
        auth: AuthSettings {
            admin_token: ADMIN_TOKEN.to_owned(),
        },
        database: DatabaseSettings {
            path: ":memory:".to_owned(),
        },
        storage: StorageSettings {
            root: artifacts.path().to_string_lossy().into_owned(),
            public_base_url: format!("http://127.0.0.1:{port}"),
            signing_secret: "test-signing-secret".to_owned(),
            url_ttl_secs: 300,
            max_bundle_bytes: 1024 * 1024,
        },
    }
}

/// Database wrapper that can be told to fail inserts or status changes.
struct FlakyStore {
    db: Arc<Database>,
    fail_insert: bool,
    fail_status_changes: bool,
}

impl BundleStore for FlakyStore {
    fn query(&self, filter: &BundleFilter) -> Result<Vec<Bundle>, StoreError> {
        self.db.query(filter)
    }

    fn find(&self, platform: Platform, version: &Version) -> Result<Option<Bundle>, StoreError> {
        self.db.find(platform, version)
    }

    fn insert(&self, bundle: &NewBundle) -> Result<Bundle, StoreError> {
        if self.fail_insert {
            return Err(StoreError::Unavailable("database is locked".to_owned()));
        }
        self.db.insert(bundle)
    }

    fn apply_status_changes(
        &self,
        platform: Platform,
        changes: &[StatusChange],
    ) -> Result<Vec<Bundle>, StoreError> {
        if self.fail_status_changes {
            return Err(StoreError::Unavailable("database is locked".to_owned()));
        }
        self.db.apply_status_changes(platform, changes)
    }

    fn append_update_log(&self, entry: &NewUpdateLog) -> Result<UpdateLog, StoreError> {
        self.db.append_update_log(entry)
    }
}

struct TestServer {
    port: u16,
    db: Arc<Database>,
    config: Arc<ServerConfig>,
    client: reqwest::Client,
    _artifacts: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|db| db as Arc<dyn BundleStore>).await
    }

    async fn start_with(wrap: impl FnOnce(Arc<Database>) -> Arc<dyn BundleStore>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().expect("No local addr").port();

        let artifacts = TempDir::new().expect("Failed to create artifact dir");
        let config = Arc::new(test_config(port, &artifacts));
        let db = Arc::new(Database::open(":memory:").expect("Failed to open in-memory database"));
        let app = build_router(AppState::new(Arc::clone(&config), wrap(Arc::clone(&db))));

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server error");
        });

        Self {
            port,
            db,
            config,
            client: reqwest::Client::new(),
            _artifacts: artifacts,
        }
    }

    fn artifact_files(&self) -> usize {
        fn count(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir).map_or(0, |entries| {
                entries
                    .flatten()
                    .map(|e| {
                        let path = e.path();
                        if path.is_dir() { count(&path) } else { 1 }
                    })
                    .sum()
            })
        }
        count(std::path::Path::new(&self.config.storage.root))
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    async fn upload(&self, fields: &[(&str, &str)], bundle: &[u8]) -> reqwest::Response {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text((*name).to_owned(), (*value).to_owned());
        }
        form = form.part(
            "bundle",
            Part::bytes(bundle.to_vec()).file_name("main.jsbundle"),
        );
        self.client
            .post(self.url("/api/bundles/upload"))
            .bearer_auth(ADMIN_TOKEN)
            .multipart(form)
            .send()
            .await
            .expect("Failed to upload bundle")
    }

    async fn upload_ok(&self, platform: &str, version: &str, min: &str, rollout: &str) {
        let resp = self
            .upload(
                &[
                    ("platform", platform),
                    ("version", version),
                    ("minAppVersion", min),
                    ("rolloutPercentage", rollout),
                ],
                format!("bundle {platform} {version}").as_bytes(),
            )
            .await;
        assert_eq!(resp.status(), 201, "upload of {platform} {version} failed");
    }

    async fn admin_post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(ADMIN_TOKEN)
            .json(body)
            .send()
            .await
            .expect("Failed to send admin request")
    }

    async fn check(&self, query: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .get(self.url("/api/bundles/check-for-updates"))
            .query(query)
            .send()
            .await
            .expect("Failed to send update check")
    }
}

// ---------------------------------------------------------------------------
// Health and auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let server = TestServer::start().await;
    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn admin_endpoints_require_token() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/api/bundles/publish"))
        .json(&json!({ "platform": "ios", "version": "1.0.0" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().is_some());

    let resp = server
        .client
        .get(server.url("/api/bundles?platform=ios"))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

// ---------------------------------------------------------------------------
// Upload and update checks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_then_check_offers_update() {
    let server = TestServer::start().await;
    let resp = server
        .upload(
            &[
                ("platform", "ios"),
                ("version", "1.2.0"),
                ("minAppVersion", "1.0"),
                ("maxAppVersion", "1.9.9"),
            ],
            b"var app = 1;",
        )
        .await;
    assert_eq!(resp.status(), 201);
    let record: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(record["status"], "published");
    assert_eq!(record["minAppVersion"], "1.0.0");
    assert_eq!(record["rolloutPercentage"], 100);
    assert_eq!(record["size"], 12);

    let resp = server
        .check(&[
            ("platform", "ios"),
            ("appVersion", "1.5"),
            ("deviceId", "device-1"),
        ])
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["updateAvailable"], true);
    assert_eq!(body["version"], "1.2.0");
    assert_eq!(body["hash"], record["hash"]);
    assert_eq!(body["size"], 12);
    assert!(body["downloadUrl"].as_str().unwrap().contains("signature="));
}

#[tokio::test]
async fn check_returns_no_content_when_current() {
    let server = TestServer::start().await;
    server.upload_ok("android", "2.0.0", "1.0.0", "100").await;

    let resp = server
        .check(&[
            ("platform", "android"),
            ("appVersion", "1.0.0"),
            ("currentBundleVersion", "2.0.0"),
            ("deviceId", "device-1"),
        ])
        .await;
    assert_eq!(resp.status(), 204);

    let resp = server
        .check(&[
            ("platform", "ios"),
            ("appVersion", "1.0.0"),
            ("deviceId", "device-1"),
        ])
        .await;
    assert_eq!(resp.status(), 204, "no bundles on the other platform");
}

#[tokio::test]
async fn check_respects_app_version_window() {
    let server = TestServer::start().await;
    let resp = server
        .upload(
            &[
                ("platform", "ios"),
                ("version", "3.0.0"),
                ("minAppVersion", "2.0.0"),
                ("maxAppVersion", "2.5.0"),
            ],
            b"x",
        )
        .await;
    assert_eq!(resp.status(), 201);

    for (app_version, expected) in [("1.9.9", 204), ("2.0.0", 200), ("2.5.0", 200), ("2.5.1", 204)] {
        let resp = server
            .check(&[
                ("platform", "ios"),
                ("appVersion", app_version),
                ("deviceId", "device-1"),
            ])
            .await;
        assert_eq!(resp.status(), expected, "appVersion {app_version}");
    }
}

#[tokio::test]
async fn zero_rollout_offers_nothing() {
    let server = TestServer::start().await;
    server.upload_ok("ios", "1.0.0", "1.0.0", "0").await;

    for device in ["a", "b", "c", "d"] {
        let resp = server
            .check(&[("platform", "ios"), ("appVersion", "1.0.0"), ("deviceId", device)])
            .await;
        assert_eq!(resp.status(), 204);
    }
}

#[tokio::test]
async fn partial_rollout_is_deterministic_per_device() {
    let server = TestServer::start().await;
    server.upload_ok("ios", "1.0.0", "1.0.0", "30").await;

    let version = parse_version("1.0.0").unwrap();
    let rollout = RolloutPercentage::new(30).unwrap();
    for i in 0..20 {
        let device = format!("device-{i}");
        let expected = if is_device_included(&device, &version, rollout) {
            200
        } else {
            204
        };
        for _ in 0..2 {
            let resp = server
                .check(&[
                    ("platform", "ios"),
                    ("appVersion", "1.0.0"),
                    ("deviceId", device.as_str()),
                ])
                .await;
            assert_eq!(resp.status(), expected, "{device}");
        }
    }
}

#[tokio::test]
async fn unpublished_upload_is_not_offered() {
    let server = TestServer::start().await;
    let resp = server
        .upload(
            &[
                ("platform", "ios"),
                ("version", "1.0.0"),
                ("minAppVersion", "1.0.0"),
                ("publish", "false"),
            ],
            b"draft",
        )
        .await;
    assert_eq!(resp.status(), 201);
    let record: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(record["status"], "draft");

    let query = [("platform", "ios"), ("appVersion", "1.0.0"), ("deviceId", "d")];
    assert_eq!(server.check(&query).await.status(), 204);

    let resp = server
        .admin_post("/api/bundles/publish", &json!({ "platform": "ios", "version": "1.0.0" }))
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(server.check(&query).await.status(), 200);
}

#[tokio::test]
async fn check_validation_errors() {
    let server = TestServer::start().await;
    for query in [
        vec![("platform", "windows"), ("appVersion", "1.0.0"), ("deviceId", "d")],
        vec![("platform", "ios"), ("appVersion", "one"), ("deviceId", "d")],
        vec![("platform", "ios"), ("appVersion", "1.0.0"), ("deviceId", " ")],
        vec![("platform", "ios"), ("appVersion", "1.0.0")],
    ] {
        let resp = server.check(&query).await;
        assert_eq!(resp.status(), 400, "{query:?}");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().is_some());
    }
}

#[tokio::test]
async fn duplicate_upload_conflicts() {
    let server = TestServer::start().await;
    server.upload_ok("ios", "1.0.0", "1.0.0", "100").await;
    let resp = server
        .upload(
            &[("platform", "ios"), ("version", "1.0"), ("minAppVersion", "1.0.0")],
            b"again",
        )
        .await;
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn upload_validation_errors() {
    let server = TestServer::start().await;
    let cases: [&[(&str, &str)]; 4] = [
        &[("platform", "ios"), ("minAppVersion", "1.0.0")],
        &[("platform", "ios"), ("version", "1.0.0"), ("minAppVersion", "2.0.0"), ("maxAppVersion", "1.0.0")],
        &[("platform", "ios"), ("version", "1.0.0"), ("minAppVersion", "1.0.0"), ("rolloutPercentage", "101")],
        &[("platform", "web"), ("version", "1.0.0"), ("minAppVersion", "1.0.0")],
    ];
    for fields in cases {
        let resp = server.upload(fields, b"x").await;
        assert_eq!(resp.status(), 400, "{fields:?}");
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rollback_reactivates_previous_bundle() {
    let server = TestServer::start().await;
    server.upload_ok("ios", "1.0.0", "1.0.0", "100").await;
    let resp = server
        .admin_post("/api/bundles/deprecate", &json!({ "platform": "ios", "version": "1.0.0" }))
        .await;
    assert_eq!(resp.status(), 200);
    server.upload_ok("ios", "1.1.0", "1.0.0", "100").await;

    let resp = server
        .admin_post("/api/bundles/rollback", &json!({ "platform": "ios", "version": "1.1.0" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["deprecated"]["version"], "1.1.0");
    assert_eq!(body["deprecated"]["status"], "deprecated");
    assert_eq!(body["reactivated"]["version"], "1.0.0");
    assert_eq!(body["reactivated"]["status"], "published");
    assert!(body["message"].as_str().is_some());

    let resp = server
        .check(&[("platform", "ios"), ("appVersion", "1.0.0"), ("deviceId", "d")])
        .await;
    let offer: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(offer["version"], "1.0.0");

    let resp = server
        .client
        .get(server.url("/api/bundles?platform=ios"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    let list: Vec<serde_json::Value> = resp.json().await.unwrap();
    let statuses: Vec<_> = list
        .iter()
        .map(|b| (b["version"].as_str().unwrap(), b["status"].as_str().unwrap()))
        .collect();
    assert_eq!(statuses, vec![("1.1.0", "deprecated"), ("1.0.0", "published")]);
}

#[tokio::test]
async fn rollback_unknown_version_is_not_found() {
    let server = TestServer::start().await;
    let resp = server
        .admin_post("/api/bundles/rollback", &json!({ "platform": "ios", "version": "9.9.9" }))
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn publishing_deprecated_bundle_conflicts() {
    let server = TestServer::start().await;
    server.upload_ok("android", "1.0.0", "1.0.0", "100").await;
    let target = json!({ "platform": "android", "version": "1.0.0" });
    assert_eq!(
        server.admin_post("/api/bundles/deprecate", &target).await.status(),
        200
    );
    assert_eq!(
        server.admin_post("/api/bundles/publish", &target).await.status(),
        409
    );
}

// ---------------------------------------------------------------------------
// Signed downloads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signed_download_serves_bundle() {
    let server = TestServer::start().await;
    server.upload_ok("ios", "1.0.0", "1.0.0", "100").await;

    let resp = server
        .check(&[("platform", "ios"), ("appVersion", "1.0.0"), ("deviceId", "d")])
        .await;
    let offer: serde_json::Value = resp.json().await.unwrap();
    let url = offer["downloadUrl"].as_str().unwrap().to_owned();

    let resp = server.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/javascript");
    assert_eq!(resp.headers()["content-length"], "16");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"bundle ios 1.0.0");

    let mut tampered = url.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });
    let resp = server.client.get(&tampered).send().await.unwrap();
    assert_eq!(resp.status(), 403);

    let unsigned = url.split_once('?').unwrap().0;
    let resp = server.client.get(unsigned).send().await.unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn signed_download_of_missing_artifact_is_not_found() {
    let server = TestServer::start().await;
    let storage = FilesystemStorage::new(&server.config.storage);
    let key = "bundles/ios/1.0.0/missing.jsbundle";
    let expires = chrono::Utc::now().timestamp() + 60;
    let url = storage.signed_url(key, expires).unwrap();

    let resp = server.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn large_bundle_download_round_trips() {
    let server = TestServer::start().await;
    let bundle: Vec<u8> = (0..300_000u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
    let resp = server
        .upload(
            &[("platform", "android"), ("version", "4.0.0"), ("minAppVersion", "1.0.0")],
            &bundle,
        )
        .await;
    assert_eq!(resp.status(), 201);

    let resp = server
        .check(&[("platform", "android"), ("appVersion", "1.0.0"), ("deviceId", "d")])
        .await;
    let offer: serde_json::Value = resp.json().await.unwrap();
    let resp = server
        .client
        .get(offer["downloadUrl"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), bundle.as_slice());
}

// ---------------------------------------------------------------------------
// Upload failure paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_insert_removes_stored_artifact() {
    let server = TestServer::start_with(|db| {
        Arc::new(FlakyStore {
            db,
            fail_insert: true,
            fail_status_changes: false,
        })
    })
    .await;

    let resp = server
        .upload(
            &[("platform", "ios"), ("version", "1.0.0"), ("minAppVersion", "1.0.0")],
            b"never recorded",
        )
        .await;
    assert_eq!(resp.status(), 503);
    assert_eq!(server.artifact_files(), 0);
}

#[tokio::test]
async fn failed_publish_returns_recorded_draft() {
    let server = TestServer::start_with(|db| {
        Arc::new(FlakyStore {
            db,
            fail_insert: false,
            fail_status_changes: true,
        })
    })
    .await;

    let resp = server
        .upload(
            &[("platform", "ios"), ("version", "1.0.0"), ("minAppVersion", "1.0.0")],
            b"draft only",
        )
        .await;
    assert_eq!(resp.status(), 201);
    let record: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(record["status"], "draft");
    assert_eq!(server.artifact_files(), 1);

    let stored = server
        .db
        .find(Platform::Ios, &parse_version("1.0.0").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(stored.artifact_key, record["artifactKey"]);
}

// ---------------------------------------------------------------------------
// Update logs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn log_update_records_outcome() {
    let server = TestServer::start().await;
    let resp = server
        .client
        .post(server.url("/api/bundles/log-update"))
        .json(&json!({
            "bundleId": 7,
            "deviceId": "device-1",
            "status": "failure",
            "errorMessage": "hash mismatch"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["bundleId"], 7);
    assert_eq!(body["status"], "failure");
    assert_eq!(body["errorMessage"], "hash mismatch");
    assert_eq!(server.db.update_log_count(7).unwrap(), 1);
}

#[tokio::test]
async fn log_update_rejects_unknown_status() {
    let server = TestServer::start().await;
    let resp = server
        .client
        .post(server.url("/api/bundles/log-update"))
        .json(&json!({ "bundleId": 1, "deviceId": "d", "status": "maybe" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(server.db.update_log_count(1).unwrap(), 0);
}
