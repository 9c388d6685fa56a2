//! Ingress pipeline tests driven through the axum router with
//! `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

use tally_common::codec::{compression, Signer};
use tally_common::transport::http::{HttpTransport, ENCRYPTED_HEADER, HASH_HEADER, REAL_IP_HEADER};
use tally_common::{Metric, MetricUpdate, TrustedSubnet, WireCodec};
use tally_server::{build_router, AppState, MetricsService};
use tally_storage::{MemoryRepository, Repository, StorageError};

fn keypair() -> (RsaPrivateKey, RsaPublicKey) {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    let private = KEY
        .get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
        .clone();
    let public = RsaPublicKey::from(&private);
    (private, public)
}

struct TestApp {
    router: Router,
    repo: Arc<dyn Repository>,
}

impl TestApp {
    fn new(codec: WireCodec, subnet: Option<&str>) -> Self {
        Self::with_repository(Arc::new(MemoryRepository::new()), codec, subnet)
    }

    fn with_repository(repo: Arc<dyn Repository>, codec: WireCodec, subnet: Option<&str>) -> Self {
        let subnet: Option<TrustedSubnet> = subnet.map(|s| s.parse().unwrap());
        let state = AppState::new(MetricsService::new(repo.clone()), codec, subnet);
        Self {
            router: build_router(state),
            repo,
        }
    }

    fn plain() -> Self {
        Self::new(WireCodec::new(), None)
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn post_json(&self, uri: &str, json: &str) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    /// Sends `value` the way the agent does.
    async fn post_encoded<T: serde::Serialize>(
        &self,
        uri: &str,
        codec: &WireCodec,
        value: &T,
        real_ip: Option<&str>,
    ) -> Response<Body> {
        let payload = codec.encode(value).unwrap();
        let ip = real_ip.map(|ip| ip.parse().unwrap());
        let (parts, body) = HttpTransport::build_request(uri, &payload, ip)
            .unwrap()
            .into_parts();
        self.send(Request::from_parts(parts, Body::new(body))).await
    }
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_update_gauge_then_read_plain_text() {
    let app = TestApp::plain();

    let response = app
        .post_json("/update", r#"{"id":"Alloc","type":"gauge","value":123.45}"#)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_string(response).await,
        r#"{"id":"Alloc","type":"gauge","value":123.45}"#
    );

    let response = app.get("/value/gauge/Alloc").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "123.45");
}

#[tokio::test]
async fn test_two_counter_batches_accumulate() {
    let app = TestApp::plain();

    for delta in [3, 4] {
        let body = format!(r#"[{{"id":"Requests","type":"counter","delta":{}}}]"#, delta);
        let response = app.post_json("/updates/", &body).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.get("/value/counter/Requests").await;
    assert_eq!(body_string(response).await, "7");
}

#[tokio::test]
async fn test_batch_with_repeated_counter_accumulates() {
    let app = TestApp::plain();
    let response = app
        .post_json(
            "/updates",
            r#"[{"id":"Requests","type":"counter","delta":3},{"id":"Requests","type":"counter","delta":4}]"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.repo.get_counter("Requests").await.unwrap(), Some(7));
}

#[tokio::test]
async fn test_path_updates() {
    let app = TestApp::plain();

    let ok = app.send(Request::post("/update/counter/PollCount/5").body(Body::empty()).unwrap()).await;
    assert_eq!(ok.status(), StatusCode::OK);
    let ok = app.send(Request::post("/update/gauge/Load/0.5").body(Body::empty()).unwrap()).await;
    assert_eq!(ok.status(), StatusCode::OK);

    assert_eq!(app.repo.get_counter("PollCount").await.unwrap(), Some(5));
    assert_eq!(app.repo.get_gauge("Load").await.unwrap(), Some(0.5));

    for uri in [
        "/update/histogram/x/1",
        "/update/gauge/x/abc",
        "/update/counter/x/1.5",
    ] {
        let response = app.send(Request::post(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_value_lookups() {
    let app = TestApp::plain();
    app.repo.update_counter("Requests", 9).await.unwrap();

    assert_eq!(app.get("/value/gauge/missing").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/value/gauge/Requests").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/value/bogus/Requests").await.status(), StatusCode::BAD_REQUEST);

    let response = app.post_json("/value", r#"{"id":"Requests","type":"counter"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    let metric: Metric = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(metric, Metric::counter("Requests", 9));

    let response = app.post_json("/value/", r#"{"id":"nope","type":"gauge"}"#).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_bodies_are_bad_request() {
    let app = TestApp::plain();
    for (uri, body) in [
        ("/updates/", "[]"),
        ("/updates/", "not json"),
        ("/update", r#"{"id":"g","type":"gauge"}"#),
        ("/update", r#"{"id":"c","type":"counter","value":1.0}"#),
        ("/update", r#"{"id":"x","type":"summary","value":1.0}"#),
        ("/update", r#"{"id":"","type":"counter","delta":1}"#),
    ] {
        let response = app.post_json(uri, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", uri, body);
    }
    assert!(app.repo.get_all_counters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_counter_overflow_is_bad_request_and_batch_is_atomic() {
    let app = TestApp::plain();
    app.repo.update_counter("big", i64::MAX).await.unwrap();

    let response = app
        .post_json(
            "/updates/",
            r#"[{"id":"g","type":"gauge","value":1.0},{"id":"big","type":"counter","delta":1}]"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.get_gauge("g").await.unwrap(), None);
}

#[tokio::test]
async fn test_ping() {
    let app = TestApp::plain();
    let response = app.get("/ping").await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Backend whose connectivity check always fails.
struct UnreachableRepository(MemoryRepository);

#[async_trait]
impl Repository for UnreachableRepository {
    async fn update_gauge(&self, id: &str, value: f64) -> tally_storage::Result<()> {
        self.0.update_gauge(id, value).await
    }

    async fn update_counter(&self, id: &str, delta: i64) -> tally_storage::Result<()> {
        self.0.update_counter(id, delta).await
    }

    async fn get_gauge(&self, id: &str) -> tally_storage::Result<Option<f64>> {
        self.0.get_gauge(id).await
    }

    async fn get_counter(&self, id: &str) -> tally_storage::Result<Option<i64>> {
        self.0.get_counter(id).await
    }

    async fn get_all_gauges(&self) -> tally_storage::Result<HashMap<String, f64>> {
        self.0.get_all_gauges().await
    }

    async fn get_all_counters(&self) -> tally_storage::Result<HashMap<String, i64>> {
        self.0.get_all_counters().await
    }

    async fn update_batch(&self, updates: &[MetricUpdate]) -> tally_storage::Result<()> {
        self.0.update_batch(updates).await
    }

    async fn ping(&self) -> tally_storage::Result<()> {
        Err(StorageError::Transient("connection refused".into()))
    }
}

#[tokio::test]
async fn test_ping_with_unreachable_backend_is_server_error() {
    let app = TestApp::with_repository(
        Arc::new(UnreachableRepository(MemoryRepository::new())),
        WireCodec::new(),
        None,
    );
    let response = app.get("/ping").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ============================================================================
// Integrity
// ============================================================================

#[tokio::test]
async fn test_tampered_payload_is_rejected_and_not_applied() {
    let app = TestApp::new(WireCodec::new().with_signing_key("secret"), None);

    let original = br#"{"id":"Alloc","type":"gauge","value":123.45}"#.to_vec();
    let tag = Signer::new("secret").sign(&original).unwrap();

    let mut tampered = original.clone();
    let pos = tampered.len() - 3;
    tampered[pos] = b'9';

    let response = app
        .send(
            Request::post("/update")
                .header(HASH_HEADER, tag.as_str())
                .body(Body::from(tampered))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.get_gauge("Alloc").await.unwrap(), None);

    let response = app
        .send(
            Request::post("/update")
                .header(HASH_HEADER, tag.as_str())
                .body(Body::from(original))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.repo.get_gauge("Alloc").await.unwrap(), Some(123.45));
}

#[tokio::test]
async fn test_missing_hash_with_key_is_rejected() {
    let app = TestApp::new(WireCodec::new().with_signing_key("secret"), None);
    let response = app
        .post_json("/updates/", r#"[{"id":"c","type":"counter","delta":1}]"#)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.get_counter("c").await.unwrap(), None);
}

#[tokio::test]
async fn test_response_is_signed_over_uncompressed_body() {
    let app = TestApp::new(WireCodec::new().with_signing_key("secret"), None);
    let agent = WireCodec::new().with_signing_key("secret");

    let response = app
        .post_encoded("/update/", &agent, &Metric::gauge("Alloc", 2.5), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-encoding"], "gzip");

    let tag = response.headers()[HASH_HEADER].to_str().unwrap().to_string();
    let packed = response.into_body().collect().await.unwrap().to_bytes();
    let plain = compression::decompress(&packed).unwrap();

    Signer::new("secret").verify(&plain, Some(&tag)).unwrap();
    let echoed: Metric = serde_json::from_slice(&plain).unwrap();
    assert_eq!(echoed, Metric::gauge("Alloc", 2.5));
}

// ============================================================================
// Compression and encryption
// ============================================================================

#[tokio::test]
async fn test_full_agent_pipeline() {
    let (private, public) = keypair();
    let app = TestApp::new(
        WireCodec::new().with_signing_key("k").with_private_key(private),
        Some("127.0.0.0/8"),
    );
    let agent = WireCodec::new().with_signing_key("k").with_public_key(public);

    let batch: Vec<Metric> = (0..40)
        .map(|i| MetricUpdate::gauge(format!("Gauge{}", i), i as f64 * 1.25).into())
        .chain(std::iter::once(Metric::counter("PollCount", 3)))
        .collect();

    let response = app
        .post_encoded("/updates/", &agent, &batch, Some("127.0.0.1"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.repo.get_gauge("Gauge39").await.unwrap(), Some(48.75));
    assert_eq!(app.repo.get_counter("PollCount").await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_bad_ciphertext_length_is_bad_request() {
    let (private, _) = keypair();
    let app = TestApp::new(WireCodec::new().with_private_key(private), None);

    let response = app
        .send(
            Request::post("/update")
                .header(ENCRYPTED_HEADER, "1")
                .body(Body::from(vec![7u8; 100]))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_gzip_is_bad_request() {
    let app = TestApp::plain();
    let response = app
        .send(
            Request::post("/update")
                .header("Content-Encoding", "gzip")
                .body(Body::from("plainly not gzip"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plain_text_response_is_not_compressed() {
    let app = TestApp::plain();
    app.repo.update_gauge("Alloc", 1.0).await.unwrap();

    let response = app
        .send(
            Request::get("/value/gauge/Alloc")
                .header("Accept-Encoding", "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert!(response.headers().get("content-encoding").is_none());
    assert_eq!(body_string(response).await, "1");
}

#[tokio::test]
async fn test_json_response_compressed_only_when_accepted() {
    let app = TestApp::plain();
    app.repo.update_gauge("Alloc", 1.0).await.unwrap();

    let plain = app.post_json("/value", r#"{"id":"Alloc","type":"gauge"}"#).await;
    assert!(plain.headers().get("content-encoding").is_none());

    let gzipped = app
        .send(
            Request::post("/value")
                .header("Accept-Encoding", "gzip, deflate")
                .body(Body::from(r#"{"id":"Alloc","type":"gauge"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(gzipped.headers()["content-encoding"], "gzip");
    let packed = gzipped.into_body().collect().await.unwrap().to_bytes();
    let metric: Metric = serde_json::from_slice(&compression::decompress(&packed).unwrap()).unwrap();
    assert_eq!(metric, Metric::gauge("Alloc", 1.0));
}

// ============================================================================
// Trusted subnet
// ============================================================================

#[tokio::test]
async fn test_untrusted_ip_rejected_on_mutating_path_only() {
    let app = TestApp::new(WireCodec::new(), Some("10.0.0.0/8"));
    app.repo.update_gauge("Alloc", 4.0).await.unwrap();

    let response = app
        .send(
            Request::post("/update")
                .header(REAL_IP_HEADER, "192.168.1.1")
                .body(Body::from(r#"{"id":"Alloc","type":"gauge","value":1.0}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(
            Request::post("/update/gauge/Alloc/2")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.repo.get_gauge("Alloc").await.unwrap(), Some(4.0));

    let response = app
        .send(
            Request::get("/value/gauge/Alloc")
                .header(REAL_IP_HEADER, "192.168.1.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(
            Request::post("/updates/")
                .header(REAL_IP_HEADER, "10.20.30.40")
                .body(Body::from(r#"[{"id":"Alloc","type":"gauge","value":1.0}]"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.repo.get_gauge("Alloc").await.unwrap(), Some(1.0));
}
