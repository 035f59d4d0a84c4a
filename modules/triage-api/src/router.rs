use std::sync::Arc;

use axum::{
    http::{header, request, HeaderValue, Method},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::rest::{self, actions};
use crate::AppState;

pub fn build_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/api/user_reports.json", get(rest::api_user_reports))
        .route(
            "/api/inconsistent_entries.json",
            get(rest::api_inconsistent_entries),
        )
        .route(
            "/api/classified_reports.json",
            get(rest::api_classified_reports),
        )
        .route("/api/track_action.json", post(actions::api_track_action))
        .route("/api/add_label.json", post(actions::api_add_label))
        .route("/api/mark_invalid.json", post(actions::api_mark_invalid))
        .route("/__version__", get(version))
        .route("/app/version.json", get(version))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .route("/__heartbeat__", get(|| async { "success" }))
        .route("/__lbheartbeat__", get(|| async { "success" }))
        .merge(api)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// Session cookies travel with API calls, so origins are listed explicitly
/// and credentials are allowed only for them. Origins compare case-insensitively.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<String> = origins
        .iter()
        .map(|origin| origin.trim().trim_end_matches('/').to_ascii_lowercase())
        .filter(|origin| !origin.is_empty())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &request::Parts| {
                origin
                    .to_str()
                    .map(|o| allowed.iter().any(|a| *a == o.to_ascii_lowercase()))
                    .unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn version() -> Json<Value> {
    Json(json!({
        "source": env!("CARGO_PKG_REPOSITORY"),
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_COMMIT").unwrap_or("unknown"),
        "build": option_env!("BUILD_ID").unwrap_or("unknown"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use triage_common::ActionLog;
    use triage_transform::testing::{raw_report, url_pattern, MemoryActionLog, MemorySource};
    use triage_transform::WorkerHandle;

    use crate::auth::EMAIL_HEADER;

    const ORIGIN: &str = "https://dashboard.example.com";

    struct Harness {
        app: Router,
        log: Arc<MemoryActionLog>,
    }

    fn harness_with(source: MemorySource, log: MemoryActionLog, skip_auth: bool) -> Harness {
        let log = Arc::new(log);
        let actions: Arc<dyn ActionLog> = log.clone();
        let state = Arc::new(AppState {
            worker: WorkerHandle::spawn(Arc::new(source)),
            actions,
            project_id: "triage-test".to_string(),
            skip_auth,
            write_allowlist: Some(vec!["triager@example.com".to_string()]),
        });
        Harness {
            app: build_router(state, &[ORIGIN.to_string()]),
            log,
        }
    }

    fn harness() -> Harness {
        let source = MemorySource::new()
            .with_reports(vec![
                raw_report("a", Some("https://www.example.com/")),
                raw_report("b", Some("https://example.org/page")),
            ])
            .with_patterns(vec![url_pattern("example.org", 1900001, "Layout broken")]);
        harness_with(source, MemoryActionLog::new(), false)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, email: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(email) = email {
            builder = builder.header(EMAIL_HEADER, email);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    // --- Views ---

    #[tokio::test]
    async fn views_require_a_window() {
        let h = harness();
        for uri in [
            "/api/user_reports.json",
            "/api/inconsistent_entries.json?from=2024-05-01",
            "/api/classified_reports.json?to=2024-05-07",
        ] {
            let (status, body) = send(&h.app, get_request(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "`from` and `to` query parameters required");
        }
    }

    #[tokio::test]
    async fn malformed_dates_are_rejected() {
        let h = harness();
        let (status, body) = send(
            &h.app,
            get_request("/api/user_reports.json?from=yesterday&to=2024-05-07"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "`from` must be a YYYY-MM-DD date");
    }

    #[tokio::test]
    async fn inconsistent_entries_returns_partitioned_groups() {
        let h = harness();
        let (status, body) = send(
            &h.app,
            get_request("/api/inconsistent_entries.json?from=2024-05-01&to=2024-05-07"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let groups = body.as_array().unwrap();
        assert_eq!(groups.len(), 2);
        let org = groups.iter().find(|g| g["root_domain"] == "example.org").unwrap();
        assert_eq!(org["known_reports"][0]["related_bugs"][0]["number"], 1900001);
    }

    #[tokio::test]
    async fn user_reports_returns_actionable_groups() {
        let h = harness();
        let (status, body) = send(
            &h.app,
            get_request("/api/user_reports.json?from=2024-05-01&to=2024-05-07"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["reports_count"], 1);
    }

    #[tokio::test]
    async fn classified_reports_validate_the_prediction() {
        let h = harness();
        let (status, _) = send(
            &h.app,
            get_request("/api/classified_reports.json?from=2024-05-01&to=2024-05-07&prediction=maybe"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &h.app,
            get_request("/api/classified_reports.json?from=2024-05-01&to=2024-05-07&prediction="),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        // Fixture reports carry no prediction.
        let (status, body) = send(
            &h.app,
            get_request("/api/classified_reports.json?from=2024-05-01&to=2024-05-07&prediction=valid"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn warehouse_failures_become_500() {
        let h = harness_with(
            MemorySource::new().failing("Not found: Dataset webcompat_user_reports"),
            MemoryActionLog::new(),
            false,
        );
        let (status, body) = send(
            &h.app,
            get_request("/api/user_reports.json?from=2024-05-01&to=2024-05-07"),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Not found: Dataset webcompat_user_reports");
    }

    // --- Mutations ---

    #[tokio::test]
    async fn track_action_needs_an_allowed_user() {
        let h = harness();
        let payload = json!({"report_uuid": "a", "type": "hide"});

        let (status, body) = send(
            &h.app,
            post_json("/api/track_action.json", None, payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, body) = send(
            &h.app,
            post_json("/api/track_action.json", Some("other@example.com"), payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "user not allowed");
        assert!(h.log.actions().is_empty());

        let (status, body) = send(
            &h.app,
            post_json("/api/track_action.json", Some("triager@example.com"), payload),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"status": "success"}));
        assert_eq!(h.log.actions(), vec![("a".to_string(), "hide".to_string())]);
    }

    #[tokio::test]
    async fn track_action_rejects_missing_fields() {
        let h = harness_with(MemorySource::new(), MemoryActionLog::new(), true);
        let (status, body) = send(
            &h.app,
            post_json("/api/track_action.json", None, json!({"report_uuid": "a"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing report_uuid or type");
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let h = harness_with(MemorySource::new(), MemoryActionLog::new(), true);
        let response = h
            .app
            .clone()
            .oneshot(post_json(
                "/api/track_action.json",
                None,
                json!({"report_uuid": 5, "type": "hide"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/mark_invalid.json")
            .body(Body::from(r#"{"report_uuid": "a"}"#))
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body["error"].is_string());
        assert!(h.log.actions().is_empty());
    }

    #[tokio::test]
    async fn add_label_writes_label_and_action() {
        let h = harness_with(MemorySource::new(), MemoryActionLog::new(), true);
        let (status, _) = send(
            &h.app,
            post_json(
                "/api/add_label.json",
                None,
                json!({"report_uuid": "a", "label": "duplicate"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(h.log.labels(), vec![("a".to_string(), "duplicate".to_string())]);
        assert_eq!(
            h.log.actions(),
            vec![("a".to_string(), "mark-duplicate".to_string())]
        );
    }

    #[tokio::test]
    async fn mark_invalid_writes_label_and_action() {
        let h = harness_with(MemorySource::new(), MemoryActionLog::new(), true);
        let (status, _) = send(
            &h.app,
            post_json("/api/mark_invalid.json", None, json!({"report_uuid": "b"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(h.log.actions(), vec![("b".to_string(), "mark-invalid".to_string())]);
        assert_eq!(h.log.labels(), vec![("b".to_string(), "invalid".to_string())]);
    }

    #[tokio::test]
    async fn failed_writes_become_500() {
        let h = harness_with(MemorySource::new(), MemoryActionLog::failing(), true);
        let (status, body) = send(
            &h.app,
            post_json("/api/mark_invalid.json", None, json!({"report_uuid": "b"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("failed"));
    }

    // --- Operational ---

    #[tokio::test]
    async fn heartbeats_answer_success() {
        let h = harness();
        for uri in ["/__heartbeat__", "/__lbheartbeat__"] {
            let response = h.app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&bytes[..], b"success");
        }
    }

    #[tokio::test]
    async fn version_object_has_all_keys() {
        let h = harness();
        for uri in ["/__version__", "/app/version.json"] {
            let (status, body) = send(&h.app, get_request(uri)).await;
            assert_eq!(status, StatusCode::OK);
            for key in ["source", "version", "commit", "build"] {
                assert!(body.get(key).is_some(), "{uri} lacks {key}");
            }
            assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        }
    }

    #[tokio::test]
    async fn cors_allows_listed_origins_with_credentials() {
        let h = harness();
        let request = Request::builder()
            .uri("/__version__")
            .header(header::ORIGIN, ORIGIN)
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let request = Request::builder()
            .uri("/__version__")
            .header(header::ORIGIN, "https://elsewhere.example.net")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn cors_matches_origins_regardless_of_case() {
        let h = harness();
        let request = Request::builder()
            .uri("/__version__")
            .header(header::ORIGIN, "https://Dashboard.Example.com")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://Dashboard.Example.com"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }
}
