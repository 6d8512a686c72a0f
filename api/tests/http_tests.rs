// Router-level tests: the full axum app wired to the in-memory store,
// driven with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use api::auth::{AuthClaims, AuthManager};
use api::report::ReportSink;
use api::state::AppState;
use shared::blob::BlobStore;
use shared::models::{Hack, Patch, PatchId};
use shared::store::memory::MemoryStore;
use shared::store::VersionStore;

const SECRET: &str = "test-secret-test-secret-test-secret";
const CREATOR: Uuid = Uuid::from_u128(1);

struct FakeBlobs;

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn presign_download(
        &self,
        bucket: &str,
        key: &str,
        _ttl: StdDuration,
    ) -> anyhow::Result<String> {
        Ok(format!("https://blobs.test/{bucket}/{key}?sig=get"))
    }

    async fn presign_upload(
        &self,
        bucket: &str,
        key: &str,
        _ttl: StdDuration,
    ) -> anyhow::Result<String> {
        Ok(format!("https://blobs.test/{bucket}/{key}?sig=put"))
    }
}

fn test_app() -> (Arc<MemoryStore>, axum::Router) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        store.clone(),
        Arc::new(FakeBlobs),
        AuthManager::new(SECRET),
        ReportSink::new(None, String::new()),
    );
    (store, api::app(state))
}

fn bearer(actor: Uuid) -> String {
    let iat = Utc::now().timestamp();
    let exp = (Utc::now() + Duration::hours(1)).timestamp();
    let claims = AuthClaims {
        sub: actor.to_string(),
        iat,
        exp,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token must encode");
    format!("Bearer {token}")
}

fn seed_hack(store: &MemoryStore, slug: &str, current: Option<PatchId>) {
    store.insert_hack(Hack {
        slug: slug.to_string(),
        title: "Test Hack".to_string(),
        created_by: CREATOR,
        original_author: None,
        permission_from: None,
        current_patch: current,
        approved: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });
}

fn seed_patch(store: &MemoryStore, slug: &str, version: &str, published: bool) -> PatchId {
    let now = Utc::now();
    store.insert_patch(Patch {
        id: 0,
        parent_hack: slug.to_string(),
        version: version.to_string(),
        changelog: None,
        bucket: None,
        filename: format!("{slug}-{version}.bps"),
        published,
        published_at: published.then_some(now),
        archived: false,
        archived_at: None,
        created_at: now,
        updated_at: now,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body must collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body must be JSON")
}

fn post(uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn publish_requires_authentication() {
    let (store, app) = test_app();
    let patch = seed_patch(&store, "h", "1.0", false);
    seed_hack(&store, "h", None);

    let response = app
        .oneshot(post(
            &format!("/api/hacks/h/patches/{patch}/publish"),
            None,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn publish_round_trip_promotes() {
    let (store, app) = test_app();
    let patch = seed_patch(&store, "h", "1.0", false);
    seed_hack(&store, "h", None);

    let response = app
        .oneshot(post(
            &format!("/api/hacks/h/patches/{patch}/publish"),
            Some(&bearer(CREATOR)),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["promoted"], true);

    let hack = store.hack_by_slug("h").await.unwrap().unwrap();
    assert_eq!(hack.current_patch, Some(patch));
}

#[tokio::test]
async fn archiving_the_current_patch_conflicts() {
    let (store, app) = test_app();
    let patch = seed_patch(&store, "h", "1.0", true);
    seed_hack(&store, "h", Some(patch));

    let response = app
        .oneshot(post(
            &format!("/api/hacks/h/patches/{patch}/archive"),
            Some(&bearer(CREATOR)),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Cannot archive the current patch version");
}

#[tokio::test]
async fn download_counting_validates_device_arity() {
    let (store, app) = test_app();
    let patch = seed_patch(&store, "h", "1.0", true);
    seed_hack(&store, "h", Some(patch));

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/patches/{patch}/downloads"),
            None,
            Some(json!({ "device_id": ["a", "b", "c", "d"] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/patches/{patch}/downloads"),
            None,
            Some(json!({ "device_id": ["a", "b", "c", "d", "e"] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["increased"], true);

    // the same device again does not count twice
    let response = app
        .oneshot(post(
            &format!("/api/patches/{patch}/downloads"),
            None,
            Some(json!({ "device_id": ["a", "b", "c", "d", "e"] })),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["increased"], false);
    assert_eq!(store.download_count(patch).await.unwrap(), 1);
}

#[tokio::test]
async fn public_download_url_for_published_patch() {
    let (store, app) = test_app();
    let patch = seed_patch(&store, "h", "1.0", true);
    seed_hack(&store, "h", Some(patch));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/patches/{patch}/url"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["url"], "https://blobs.test/patches/h-1.0.bps?sig=get");
}

#[tokio::test]
async fn health_reports_ok() {
    let (_store, app) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_routes_return_typed_not_found() {
    let (_store, app) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "RouteNotFound");
}
