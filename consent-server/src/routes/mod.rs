use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http::{header::CONTENT_TYPE, Uri};
use prometheus::{Encoder, TextEncoder};
use tower::ServiceBuilder;
use tower_http::{
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;

use consent_slo::{errors, Result};

use crate::{
    controllers::{consent, grants},
    middlewares::{trace_id, MakeSpanWithTrace},
    var::{HTTP_REQUESTS_DURATION_SECONDS, HTTP_REQUESTS_TOTAL},
    AppState,
};

#[derive(Debug)]
pub struct AppRouter;

impl AppRouter {
    pub fn build(state: AppState) -> Router {
        Router::new()
            .nest_service("/static", ServeDir::new("static"))
            .merge(consent::new_router(state.clone()))
            .nest("/v1", grants::new_router(state))
            .fallback(Self::not_found)
            .layer(
                ServiceBuilder::new().layer(
                    TraceLayer::new_for_http()
                        .make_span_with(
                            MakeSpanWithTrace::new().level(Level::INFO),
                        )
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                ),
            )
            .layer(middleware::from_fn(trace_id))
            .route_layer(middleware::from_fn(Self::track_metrics))
            .route("/metrics", get(Self::metrics))
    }

    async fn track_metrics(request: Request, next: Next) -> impl IntoResponse {
        let path = if let Some(matched_path) =
            request.extensions().get::<MatchedPath>()
        {
            matched_path.as_str().to_owned()
        } else {
            request.uri().path().to_owned()
        };
        let start = Instant::now();
        let method = request.method().to_string();
        let response = next.run(request).await;
        let latency = start.elapsed();

        let labels = vec![method.as_str(), path.as_str()];
        HTTP_REQUESTS_TOTAL.with_label_values(&labels).inc();
        HTTP_REQUESTS_DURATION_SECONDS
            .with_label_values(&labels)
            .observe(latency.as_secs_f64());

        response
    }

    async fn metrics() -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(errors::any)?;

        Response::builder()
            .status(200)
            .header(CONTENT_TYPE, encoder.format_type())
            .body(Body::from(buffer))
            .map_err(errors::any)
    }

    async fn not_found(uri: Uri) -> impl IntoResponse {
        errors::not_found(&format!("no route for {}", uri))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;
    use http::{header, Method, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        middlewares::TRACE_ID, services::consent::registry::Registry, App,
        AppConfig,
    };

    const RETURN_URL: &str =
        "/connect/authorize/callback?client_id=acme&scope=openid%20api1";
    const API_ONLY: &str =
        "/connect/authorize/callback?client_id=acme&scope=api1";

    fn router() -> Router {
        let registry: Registry = toml::from_str(
            r#"
[[clients]]
client_id = "acme"
client_name = "Acme App"
client_uri = "https://acme.example"

[[api_scopes]]
name = "api1"
display_name = "My API"
"#,
        )
        .unwrap();
        let config = AppConfig {
            config: None,
            rust_log: "consent_server=debug".to_owned(),
            port: 30050,
            endpoint: "127.0.0.1".to_owned(),
            cache_size: 8,
            registry: None,
        };
        AppRouter::build(AppState(Arc::new(App::new(config, registry))))
    }

    fn query(return_url: &str) -> String {
        serde_urlencoded::to_string([("returnUrl", return_url)]).unwrap()
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(fields: &[(&str, &str)]) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/consent")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
            .unwrap()
    }

    async fn body(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_render_consent_page() {
        let resp = router()
            .oneshot(get(&format!("/consent?{}", query(RETURN_URL))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(TRACE_ID));
        let html = body(resp).await;
        assert!(html.contains("Acme App"));
        assert!(html.contains("Personal Information"));
        assert!(html.contains("Application Access"));
        assert!(html.contains("class=\"client-link\""));
    }

    #[tokio::test]
    async fn test_render_rejects_bad_query() {
        let resp = router().oneshot(get("/consent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router().oneshot(get("/consent?returnUrl=")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = router()
            .oneshot(get(&format!(
                "/consent?{}",
                query("https://evil.example/cb?client_id=acme&scope=openid")
            )))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_allow_redirects_and_records_required_scope() {
        let app = router();
        // the disabled openid checkbox is not posted
        let resp = app
            .clone()
            .oneshot(post(&[
                ("returnUrl", RETURN_URL),
                ("scopesConsented", "api1"),
                ("rememberConsent", "true"),
                ("button", "yes"),
            ]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], RETURN_URL);

        let resp = app
            .clone()
            .oneshot(get(&format!("/v1/decisions?{}", query(RETURN_URL))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let decision: Value = serde_json::from_str(&body(resp).await).unwrap();
        assert_eq!(decision["client_id"], "acme");
        assert_eq!(decision["granted"], true);
        assert_eq!(decision["remember"], true);
        assert_eq!(decision["scopes"], serde_json::json!(["openid", "api1"]));

        let resp = app.clone().oneshot(get("/v1/grants/acme")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/v1/grants/acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app.oneshot(get("/v1/grants/acme")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_allow_without_remember_forgets_grant() {
        let app = router();
        let resp = app
            .clone()
            .oneshot(post(&[
                ("returnUrl", RETURN_URL),
                ("scopesConsented", "api1"),
                ("rememberConsent", "true"),
                ("button", "yes"),
            ]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let resp = app.clone().oneshot(get("/v1/grants/acme")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(post(&[
                ("returnUrl", RETURN_URL),
                ("scopesConsented", "api1"),
                ("button", "yes"),
            ]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let resp = app.oneshot(get("/v1/grants/acme")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deny_redirects() {
        let app = router();
        let resp = app
            .clone()
            .oneshot(post(&[("returnUrl", RETURN_URL), ("button", "no")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let resp = app
            .oneshot(get(&format!("/v1/decisions?{}", query(RETURN_URL))))
            .await
            .unwrap();
        let decision: Value = serde_json::from_str(&body(resp).await).unwrap();
        assert_eq!(decision["granted"], false);
    }

    #[tokio::test]
    async fn test_allow_nothing_rerenders_with_error() {
        let app = router();
        let resp = app
            .clone()
            .oneshot(post(&[("returnUrl", API_ONLY), ("button", "yes")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body(resp).await;
        let error = html.find("You must pick at least one permission").unwrap();
        assert!(error < html.find("<form").unwrap());
        // previous choices are kept
        assert!(html.contains("value=\"api1\">"));
        assert!(html.contains("name=\"rememberConsent\" value=\"true\">"));

        let resp = app
            .oneshot(get(&format!("/v1/decisions?{}", query(API_ONLY))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_button() {
        let resp = router()
            .oneshot(post(&[("returnUrl", RETURN_URL), ("button", "maybe")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fallback_and_metrics() {
        let resp = router().oneshot(get("/nowhere")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().contains_key(TRACE_ID));
        let payload: Value = serde_json::from_str(&body(resp).await).unwrap();
        assert_eq!(payload["code"], "1010002");

        let resp = router().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
