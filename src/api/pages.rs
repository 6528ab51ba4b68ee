//! Server-rendered review page.
//!
//! `NoFile -> Loaded -> {ValidationFailed | Scored}`: the upload creates a
//! session, and every view of the session page re-runs the whole pipeline
//! with the parameters in the query string.

use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{
    routing::{get, post},
    Router,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::read_upload_form;
use crate::api::session::Upload;
use crate::api::state::AppState;
use crate::ingest::{self, Dataset, Value};
use crate::pipeline::{
    self, AnalysisParams, ParamRequest, PipelineError, ResultsOutcome, RunResult,
    CONTAMINATION_DEFAULT, CONTAMINATION_MAX, CONTAMINATION_MIN, NO_ANOMALIES_MESSAGE,
};
use crate::report::chart::ScatterChart;
use crate::report::export::{self, EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME};
use crate::report::PREVIEW_ROWS;

pub const UPLOAD_PROMPT: &str = "Please upload a CSV file to begin the analysis.";

pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/session/{id}", get(session_page))
        .route("/session/{id}/export", get(export_anomalies))
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Template)]
#[template(path = "index.html")]
struct IndexPage {
    info: String,
    error: String,
}

/// One entry of a column picker.
struct SelectOption {
    name: String,
    selected: bool,
}

/// Sidebar controls. Only rendered when the file has enough numeric columns.
#[derive(Default)]
struct Controls {
    x_options: Vec<SelectOption>,
    y_options: Vec<SelectOption>,
    contamination: String,
    min: String,
    max: String,
}

#[derive(Template)]
#[template(path = "session.html")]
struct SessionPage {
    session_id: String,
    file_name: String,
    preview_columns: Vec<String>,
    preview_rows: Vec<Vec<String>>,
    has_controls: bool,
    controls: Controls,
    /// Parse or scoring failure.
    error: String,
    validation: String,
    chart_svg: String,
    has_results: bool,
    success: String,
    anomaly_count: usize,
    anomaly_columns: Vec<String>,
    anomaly_rows: Vec<Vec<String>>,
    params: ParamRequestView,
}

/// Resolved parameters echoed into the download form.
#[derive(Default)]
struct ParamRequestView {
    feature_x: String,
    feature_y: String,
    contamination: String,
}

impl Controls {
    fn build(numeric_columns: &[String], params: &AnalysisParams) -> Self {
        let options = |selected: &str| {
            numeric_columns
                .iter()
                .map(|name| SelectOption {
                    name: name.clone(),
                    selected: name == selected,
                })
                .collect()
        };
        Self {
            x_options: options(&params.feature_x),
            y_options: options(&params.feature_y),
            contamination: format!("{:.2}", params.contamination),
            min: format!("{:.2}", CONTAMINATION_MIN),
            max: format!("{:.2}", CONTAMINATION_MAX),
        }
    }
}

fn render<T: Template>(status: StatusCode, page: &T) -> Response {
    match page.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, "template rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "template rendering failed").into_response()
        }
    }
}

fn index_with(status: StatusCode, error: impl Into<String>) -> Response {
    render(
        status,
        &IndexPage {
            info: UPLOAD_PROMPT.to_string(),
            error: error.into(),
        },
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Response {
    index_with(StatusCode::OK, "")
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(e) => return index_with(StatusCode::BAD_REQUEST, e.body_text()),
    };
    let Some(file) = form.file else {
        return index_with(StatusCode::BAD_REQUEST, UPLOAD_PROMPT);
    };
    if let Err(e) = ingest::check_upload_type(file.file_name.as_deref(), file.content_type.as_deref()) {
        warn!(error = %e, "rejected upload");
        return index_with(
            StatusCode::UNPROCESSABLE_ENTITY,
            pipeline::error_message(&PipelineError::Parse(e)),
        );
    }

    let file_name = file.file_name.unwrap_or_else(|| "upload.csv".to_string());
    let size = file.bytes.len();
    let id = state.sessions.insert(Upload::new(file_name.clone(), file.bytes)).await;
    info!(session = %id, file = %file_name, bytes = size, "file uploaded");
    Redirect::to(&format!("/session/{}", id)).into_response()
}

/// Everything the session page needs, computed off the async runtime.
struct PageRun {
    preview_columns: Vec<String>,
    preview_rows: Vec<Vec<String>>,
    numeric_columns: Vec<String>,
    outcome: Result<RunResult, PipelineError>,
}

fn run_for_page(bytes: &[u8], request: &ParamRequest, state: &AppState) -> PageRun {
    let dataset = match ingest::parse_csv(bytes) {
        Ok(ds) => ds,
        Err(e) => {
            return PageRun {
                preview_columns: Vec::new(),
                preview_rows: Vec::new(),
                numeric_columns: Vec::new(),
                outcome: Err(e.into()),
            }
        }
    };
    let (preview_columns, preview_rows) = preview(&dataset);
    let numeric_columns = dataset.numeric_columns();
    let outcome = pipeline::run_dataset(dataset, request, state.scorer.as_ref());
    PageRun {
        preview_columns,
        preview_rows,
        numeric_columns,
        outcome,
    }
}

fn preview(dataset: &Dataset) -> (Vec<String>, Vec<Vec<String>>) {
    let rows = dataset
        .head(PREVIEW_ROWS)
        .iter()
        .map(|row| row.iter().map(Value::to_string).collect())
        .collect();
    (dataset.column_names(), rows)
}

async fn load_and_run(state: &AppState, id: Uuid, request: ParamRequest) -> Result<(Upload, PageRun), Response> {
    let Some(upload) = state.sessions.get(&id).await else {
        return Err(index_with(
            StatusCode::NOT_FOUND,
            "This session has expired. Please upload the file again.",
        ));
    };
    let bytes = upload.bytes.clone();
    let run_state = state.clone();
    let run = tokio::task::spawn_blocking(move || run_for_page(&bytes, &request, &run_state))
        .await
        .map_err(|e| {
            error!(error = %e, "pipeline task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "pipeline task failed").into_response()
        })?;
    Ok((upload, run))
}

async fn session_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(request): Query<ParamRequest>,
) -> Response {
    let (upload, run) = match load_and_run(&state, id, request.clone()).await {
        Ok(loaded) => loaded,
        Err(response) => return response,
    };

    let mut page = SessionPage {
        session_id: id.to_string(),
        file_name: upload.file_name,
        preview_columns: run.preview_columns,
        preview_rows: run.preview_rows,
        has_controls: false,
        controls: Controls::default(),
        error: String::new(),
        validation: String::new(),
        chart_svg: String::new(),
        has_results: false,
        success: String::new(),
        anomaly_count: 0,
        anomaly_columns: Vec::new(),
        anomaly_rows: Vec::new(),
        params: ParamRequestView::default(),
    };

    // Controls stay usable after a scoring error so another pair can be picked.
    if run.numeric_columns.len() >= ingest::MIN_NUMERIC_COLUMNS {
        let shown = AnalysisParams::resolve(&request, &run.numeric_columns).unwrap_or_else(|_| AnalysisParams {
            feature_x: run.numeric_columns[0].clone(),
            feature_y: run.numeric_columns[1].clone(),
            contamination: CONTAMINATION_DEFAULT,
        });
        page.has_controls = true;
        page.controls = Controls::build(&run.numeric_columns, &shown);
    }

    let status = match run.outcome {
        Err(e) => {
            warn!(session = %id, error = %e, "pipeline run failed");
            page.error = pipeline::error_message(&e);
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Ok(RunResult::ValidationFailed { reason, .. }) => {
            page.validation = reason.to_string();
            StatusCode::OK
        }
        Ok(RunResult::Scored(scored)) => {
            match ScatterChart::build(&scored).render() {
                Ok(svg) => page.chart_svg = svg,
                Err(e) => {
                    error!(error = %e, "chart rendering failed");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "chart rendering failed").into_response();
                }
            }
            page.has_results = true;
            let params = scored.params();
            page.params = ParamRequestView {
                feature_x: params.feature_x.clone(),
                feature_y: params.feature_y.clone(),
                contamination: params.contamination.to_string(),
            };
            match scored.outcome() {
                ResultsOutcome::NoAnomalies => page.success = NO_ANOMALIES_MESSAGE.to_string(),
                ResultsOutcome::Anomalies { count } => {
                    let table = scored.anomalies();
                    page.anomaly_count = count;
                    page.anomaly_columns = table.columns().to_vec();
                    page.anomaly_rows = table.rows().to_vec();
                }
            }
            StatusCode::OK
        }
    };
    render(status, &page)
}

async fn export_anomalies(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(request): Query<ParamRequest>,
) -> Response {
    let (_, run) = match load_and_run(&state, id, request).await {
        Ok(loaded) => loaded,
        Err(response) => return response,
    };

    let scored = match run.outcome {
        Ok(RunResult::Scored(scored)) => scored,
        Ok(RunResult::ValidationFailed { reason, .. }) => {
            return (StatusCode::UNPROCESSABLE_ENTITY, reason.to_string()).into_response()
        }
        Err(e) => return (StatusCode::UNPROCESSABLE_ENTITY, pipeline::error_message(&e)).into_response(),
    };
    if scored.outcome() == ResultsOutcome::NoAnomalies {
        return (StatusCode::NOT_FOUND, NO_ANOMALIES_MESSAGE).into_response();
    }

    match export::to_csv(&scored.anomalies()) {
        Ok(body) => {
            info!(session = %id, bytes = body.len(), "anomaly list exported");
            (
                [
                    (header::CONTENT_TYPE, EXPORT_CONTENT_TYPE.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "CSV export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "CSV export failed").into_response()
        }
    }
}
