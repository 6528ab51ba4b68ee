//! JSON API route definitions.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::api::read_upload_form;
use crate::api::state::AppState;
use crate::ingest;
use crate::pipeline::{self, PipelineError, RunReport};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "scorer": state.scorer.name(),
            "sessions": state.sessions.len().await,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Run the pipeline on a multipart upload and return the run report.
async fn analyze(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };
    let Some(file) = form.file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "state": "no_file", "message": "missing multipart field 'file'" })),
        )
            .into_response();
    };
    info!(file = ?file.file_name, bytes = file.bytes.len(), "analyze request");

    if let Err(e) = ingest::check_upload_type(file.file_name.as_deref(), file.content_type.as_deref()) {
        let report = RunReport::from_outcome(&Err(PipelineError::Parse(e)));
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response();
    }

    let scorer = state.scorer.clone();
    let params = form.params;
    let outcome = tokio::task::spawn_blocking(move || pipeline::run(&file.bytes, &params, scorer.as_ref())).await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "analysis task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "analysis task failed").into_response();
        }
    };

    let status = if outcome.is_err() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (status, Json(RunReport::from_outcome(&outcome))).into_response()
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::state::AppState;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt; // for `oneshot`

    const BOUNDARY: &str = "apiboundary";

    fn analyze_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, file_name, value) in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match file_name {
                Some(f) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n",
                    name, f
                )),
                None => body.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));

        Request::builder()
            .method("POST")
            .uri("/api/v1/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(AppState::new(Config::default()));
        let request = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["scorer"], "isolation_forest");
        assert!(json["data"]["version"].is_string());
    }

    #[tokio::test]
    async fn test_analyze_reports_anomalies() {
        let csv = "a,b\n1,2\n2,3\n3,1\n2,2\n1,3\n3,3\n2,1\n1,1\n3,2\n40,-30\n";
        let app = router(AppState::new(Config::default()));
        let response = app
            .oneshot(analyze_request(&[
                ("file", Some("data.csv"), csv),
                ("contamination", None, "0.1"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["state"], "scored_with_anomalies");
        assert_eq!(json["anomaly_count"], 1);
        assert_eq!(json["params"]["feature_x"], "a");
        assert_eq!(json["anomalies"]["rows"][0][0], "40");
    }

    #[tokio::test]
    async fn test_analyze_without_file() {
        let app = router(AppState::new(Config::default()));
        let response = app
            .oneshot(analyze_request(&[("feature_x", None, "a")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_bad_contamination_is_validation_failure() {
        let app = router(AppState::new(Config::default()));
        let response = app
            .oneshot(analyze_request(&[
                ("file", Some("data.csv"), "a,b\n1,2\n3,4\n"),
                ("contamination", None, "lots"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["state"], "validation_failed");
    }
}
