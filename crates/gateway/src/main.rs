//! CMR API Gateway
//!
//! The entry point for the mobile app.
//! Handles:
//! - Authentication (bearer JWT)
//! - Document, attachment and lifecycle routes
//! - PDF download
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod state;

pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use cmr_common::{
    auth::JwtManager,
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, DocumentStore, Repository},
    errors::AppError,
    metrics,
    storage::{HttpObjectStore, ObjectStore},
};
use cmr_export::{ExportOptions, HttpImageFetcher, ImageFetcher};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::oneshot};
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Maximum concurrent requests (backpressure control)
const MAX_CONCURRENT_REQUESTS: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting CMR API Gateway v{}", cmr_common::VERSION);

    install_metrics(&config.observability)?;
    metrics::register_metrics();

    let secret = config
        .auth
        .jwt_secret
        .clone()
        .ok_or_else(|| AppError::Configuration {
            message: "auth.jwt_secret must be set".to_string(),
        })?;
    let jwt = Arc::new(JwtManager::new(&secret, config.auth.jwt_expiration_secs));

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let store: Arc<dyn DocumentStore> = Arc::new(Repository::new(db.clone()));
    let objects: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(&config.storage)?);
    let export = ExportOptions::from_config(&config.export)?;
    let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpImageFetcher::new(export.image_timeout)?);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let grace = config.shutdown_timeout();
    let state = AppState::new(config, store, objects, fetcher, export, jwt).with_database(db);
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // In-flight requests get `grace` to finish once a signal arrives
    let (signalled, on_signal) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled.send(());
        })
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = async {
            if on_signal.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => warn!(timeout_secs = grace.as_secs(), "Shutdown timed out, dropping open connections"),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

/// Serve Prometheus metrics on their own port; port 0 disables the exporter
fn install_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("export_duration_seconds".to_string()),
            metrics::EXPORT_BUCKETS,
        )?
        .install()?;

    info!(port = config.metrics_port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
pub(crate) fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.server.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Documents
        .route(
            "/documents",
            get(handlers::documents::list_documents).post(handlers::documents::create_document),
        )
        .route(
            "/documents/{id}",
            get(handlers::documents::get_document).patch(handlers::documents::update_document),
        )
        .route("/documents/{id}/archive", post(handlers::documents::archive_document))
        .route("/documents/{id}/unarchive", post(handlers::documents::unarchive_document))

        // Lifecycle
        .route("/documents/{id}/actions/{action}", post(handlers::actions::dispatch_action))

        // Attachments
        .route("/documents/{id}/reserves", post(handlers::reserves::create_reserve))
        .route("/reserves/{id}", delete(handlers::reserves::delete_reserve))
        .route("/documents/{id}/photos", post(handlers::photos::add_photo))
        .route("/photos/{id}", delete(handlers::photos::delete_photo))
        .route("/documents/{id}/signatures", post(handlers::signatures::capture_signature))

        // Export
        .route("/documents/{id}/export.pdf", get(handlers::export::export_pdf));

    Router::new()
        .nest("/v1", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors)
                .layer(TimeoutLayer::new(request_timeout))
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
                .layer(axum::middleware::from_fn(middleware::metrics::track_requests)),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use cmr_common::{MemoryObjectStore, MemoryStore};
    use cmr_export::ExportError;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    /// Every URL is unreachable, so exports render placeholders
    struct OfflineFetcher;

    #[async_trait]
    impl ImageFetcher for OfflineFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExportError> {
            Err(ExportError::ImageFetch {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    struct TestApp {
        router: Router,
        token: String,
    }

    impl TestApp {
        fn new() -> Self {
            let jwt = Arc::new(JwtManager::new("test-secret", 3600));
            let token = jwt.generate_token(Uuid::new_v4(), None).unwrap();
            let state = AppState::new(
                AppConfig::default(),
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryObjectStore::new()),
                Arc::new(OfflineFetcher),
                ExportOptions::default(),
                jwt,
            );
            Self {
                router: create_router(state),
                token,
            }
        }

        async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
            let builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", self.token));
            let request = match body {
                Some(json) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string())),
                None => builder.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, bytes.to_vec())
        }

        async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let (status, bytes) = self.send(method, uri, body).await;
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    fn signature_png() -> String {
        let img = image::RgbaImage::from_pixel(8, 4, image::Rgba([0, 0, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(out.into_inner()))
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let app = TestApp::new();
        let request = Request::builder().uri("/v1/health").body(Body::empty()).unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let (status, ready) = app.json("GET", "/v1/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ready["status"], "ready");
    }

    #[tokio::test]
    async fn test_documents_require_token() {
        let app = TestApp::new();
        let request = Request::builder().uri("/v1/documents").body(Body::empty()).unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_full_flow_over_http() {
        let app = TestApp::new();

        let (status, doc) = app
            .json(
                "POST",
                "/v1/documents",
                Some(json!({ "cmr_number": "FR-77", "shipper_name": "Laiterie du Val" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(doc["status"], "ready_to_load");
        let id = doc["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .json("POST", &format!("/v1/documents/{}/actions/loading_start", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, err) = app
            .json("POST", &format!("/v1/documents/{}/actions/loading_end", id), None)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"]["code"], "MISSING_SHIPPER_SIGNATURE");

        let (status, signed) = app
            .json(
                "POST",
                &format!("/v1/documents/{}/signatures", id),
                Some(json!({ "party": "shipper", "signer_name": "A. Morel", "image": signature_png() })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(signed["transition"].is_null());

        for action in ["loading_end", "delivery_start"] {
            let (status, _) = app
                .json("POST", &format!("/v1/documents/{}/actions/{}", id, action), None)
                .await;
            assert_eq!(status, StatusCode::OK, "{}", action);
        }

        let (status, _) = app
            .json(
                "POST",
                &format!("/v1/documents/{}/reserves", id),
                Some(json!({ "side": "delivery", "reserve_type": "Colis endommagé" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, captured) = app
            .json(
                "POST",
                &format!("/v1/documents/{}/signatures", id),
                Some(json!({ "party": "consignee", "image": signature_png() })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(captured["transition"]["to"], "completed_with_reserves");

        let (status, detail) = app.json("GET", &format!("/v1/documents/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["events"].as_array().unwrap().len(), 4);
        assert!(detail["allowed_actions"].as_array().unwrap().is_empty());

        let (status, pdf) = app
            .send("GET", &format!("/v1/documents/{}/export.pdf", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_export_headers() {
        let app = TestApp::new();
        let (_, doc) = app
            .json("POST", "/v1/documents", Some(json!({ "cmr_number": "FR-88" })))
            .await;
        let id = doc["id"].as_str().unwrap();

        let request = Request::builder()
            .uri(format!("/v1/documents/{}/export.pdf", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"CMR_FR-88_"));
        assert!(disposition.ends_with(".pdf\""));
    }

    #[tokio::test]
    async fn test_unknown_action_is_bad_request() {
        let app = TestApp::new();
        let (_, doc) = app.json("POST", "/v1/documents", Some(json!({}))).await;
        let id = doc["id"].as_str().unwrap();

        let (status, err) = app
            .json("POST", &format!("/v1/documents/{}/actions/teleport", id), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "UNKNOWN_ACTION");

        let (_, detail) = app.json("GET", &format!("/v1/documents/{}", id), None).await;
        assert_eq!(detail["document"]["status"], "ready_to_load");
    }

    #[tokio::test]
    async fn test_patch_edits_fields_not_status() {
        let app = TestApp::new();
        let (_, doc) = app.json("POST", "/v1/documents", Some(json!({}))).await;
        let id = doc["id"].as_str().unwrap();
        app.json("POST", &format!("/v1/documents/{}/actions/loading_start", id), None)
            .await;

        let (status, patched) = app
            .json(
                "PATCH",
                &format!("/v1/documents/{}", id),
                Some(json!({
                    "status": "completed",
                    "archived": true,
                    "loading_arrival_at": "2026-03-14T06:30:00+01:00",
                    "gross_weight_kg": "18250.00"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["status"], "loading");
        assert_eq!(patched["archived"], false);
        assert!(!patched["loading_arrival_at"].is_null());

        let (status, err) = app
            .json("PATCH", &format!("/v1/documents/{}", id), Some(json!({ "weight": 1 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_list_filters_and_archive() {
        let app = TestApp::new();
        let (_, first) = app.json("POST", "/v1/documents", Some(json!({}))).await;
        let (_, second) = app.json("POST", "/v1/documents", Some(json!({}))).await;
        let first_id = first["id"].as_str().unwrap();
        app.json("POST", &format!("/v1/documents/{}/actions/loading_start", first_id), None)
            .await;

        let (_, loading) = app.json("GET", "/v1/documents?status=loading", None).await;
        assert_eq!(loading["count"], 1);
        assert_eq!(loading["documents"][0]["id"], first["id"]);

        let second_id = second["id"].as_str().unwrap();
        let (status, archived) = app
            .json("POST", &format!("/v1/documents/{}/archive", second_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(archived["archived"], true);

        let (_, active) = app.json("GET", "/v1/documents?archived=false", None).await;
        assert_eq!(active["count"], 1);

        let (status, _) = app.json("GET", "/v1/documents?status=shipped", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_photo_upload_and_delete() {
        let app = TestApp::new();
        let (_, doc) = app.json("POST", "/v1/documents", Some(json!({}))).await;
        let id = doc["id"].as_str().unwrap();

        let (status, photo) = app
            .json(
                "POST",
                &format!("/v1/documents/{}/photos", id),
                Some(json!({ "image": signature_png() })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let photo_id = photo["id"].as_str().unwrap();
        let (status, _) = app.send("DELETE", &format!("/v1/photos/{}", photo_id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.send("DELETE", &format!("/v1/photos/{}", photo_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
