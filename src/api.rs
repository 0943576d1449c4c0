//! HTTP API handlers for CareWatch.
//!
//! Handlers return [`ApiError`] on failure, which maps domain errors to status
//! codes. Logging records counts, scores and identifiers only; symptom names,
//! vitals and free-text notes are never written to the log.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::analysis::Analyzer;
use crate::error::{ApiError, SurveillanceError};
use crate::rules::SyndromeInfo;
use crate::model::{
    AnalysesQuery, AnalysisRecord, CaseReviewRequest, CasesQuery, DetectRequest, DiseaseCase,
    NewDiseaseCase, Outbreak, OutbreakActionRequest, OutbreakStatusRequest, OutbreaksQuery,
    SubmissionRequest, SummaryQuery, SymptomReport,
};
use crate::storage::Storage;
use crate::summary::SurveillanceSummary;
use crate::surveillance::{
    self, DetectionParams, DetectionReport, MAX_WINDOW_DAYS, case_from_analysis,
};

/// Largest page a list endpoint returns.
const MAX_LIST_LIMIT: u32 = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub analyzer: Analyzer,

    /// Defaults for detection requests that omit parameters.
    pub detection: DetectionParams,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyses", post(post_analysis).get(list_analyses))
        .route("/analyses/:id", get(get_analysis))
        .route("/analyses/:id/rerun", post(rerun_analysis))
        .route("/cases", get(list_cases).post(post_case))
        .route("/cases/:id", patch(review_case))
        .route("/outbreaks", get(list_outbreaks))
        .route("/outbreaks/detect", post(detect_outbreaks))
        .route("/outbreaks/:id", get(get_outbreak))
        .route("/outbreaks/:id/status", patch(update_outbreak_status))
        .route("/outbreaks/:id/actions", post(post_outbreak_action))
        .route("/outbreaks/:id/refresh", post(refresh_outbreak))
        .route("/surveillance/summary", get(get_summary))
        .route("/symptoms", get(list_symptoms))
        .route("/syndromes", get(list_syndromes))
        .route("/syndromes/:name", get(get_syndrome))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON body extractor whose rejections are [`ApiError::BadRequest`].
///
/// Unlike [`Json`], a decoding failure names the path of the offending value
/// (`symptoms[0].severity`) and comes back in the usual JSON error body. An
/// empty body decodes as `{}`, so bodies whose fields all default may be
/// omitted entirely.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest {
                field: None,
                reason: e.body_text(),
            })?;
        parse_json_body(&bytes).map(ApiJson)
    }
}

fn parse_json_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        bytes
    };

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut de).map_err(|err| {
        let path = err.path().to_string();
        ApiError::BadRequest {
            field: (path != ".").then_some(path),
            reason: err.into_inner().to_string(),
        }
    })?;
    de.end().map_err(|e| ApiError::BadRequest {
        field: None,
        reason: e.to_string(),
    })?;
    Ok(value)
}

fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIST_LIMIT)
}

fn clean_location(location: Option<&str>) -> Option<&str> {
    location.map(str::trim).filter(|l| !l.is_empty())
}

/// Analyze a report and persist the analysis, plus its derived case if any.
async fn analyze_and_record(
    state: &AppState,
    report: &SymptomReport,
    location: Option<&str>,
) -> Result<AnalysisRecord, ApiError> {
    let result = state.analyzer.analyze(report).map_err(|e| {
        warn!(error = %e, "Rejected symptom report");
        e
    })?;

    let case = case_from_analysis(&result, location, state.analyzer.rules());
    let record = state
        .storage
        .record_analysis(report, &result, location, case)
        .await?;

    info!(
        analysis_id = record.id,
        symptom_count = report.symptoms.len(),
        risk_score = %format!("{:.2}", record.result.risk_score),
        risk_level = %record.result.risk_level,
        syndrome = %record.result.predicted_syndrome,
        flagged = record.result.flagged_for_review,
        disease_case_id = ?record.disease_case_id,
        "Analysis recorded"
    );

    Ok(record)
}

/// POST /analyses - Analyze a symptom report.
///
/// # Request Body
///
/// ```json
/// {
///     "symptoms": [
///         { "name": "cough", "severity": 6, "duration": { "value": 3, "unit": "days" } }
///     ],
///     "vital_signs": { "temperature": 101.2 },
///     "recent_travel": false,
///     "recent_exposure": true,
///     "location": "Clinic A"
/// }
/// ```
///
/// `vital_signs`, the travel and exposure flags, and `location` are optional.
/// When a location is given and a syndrome is recognized, a disease case is
/// logged for surveillance.
///
/// # Response
///
/// Returns `201 Created` with the stored analysis record.
#[instrument(skip(state, request))]
pub async fn post_analysis(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SubmissionRequest>,
) -> Result<(StatusCode, Json<AnalysisRecord>), ApiError> {
    let (report, location) = request.into_parts();
    let location = clean_location(location.as_deref());
    let record = analyze_and_record(&state, &report, location).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /analyses - List analyses, newest first.
///
/// # Query Parameters
///
/// - `flagged` (optional): only flagged (`true`) or unflagged (`false`) analyses
/// - `limit` (optional): page size (default: 50, max: 500)
#[instrument(skip(state))]
pub async fn list_analyses(
    State(state): State<AppState>,
    Query(query): Query<AnalysesQuery>,
) -> Result<Json<Vec<AnalysisRecord>>, ApiError> {
    let records = state
        .storage
        .list_analyses(query.flagged, clamp_limit(query.limit))
        .await?;

    info!(count = records.len(), flagged = ?query.flagged, "Analyses listed");
    Ok(Json(records))
}

/// GET /analyses/:id
#[instrument(skip(state))]
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AnalysisRecord>, ApiError> {
    state
        .storage
        .get_analysis(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("analysis {id}")))
}

/// POST /analyses/:id/rerun - Analyze a stored report again with the current rules.
///
/// The original record is left untouched; the new result is stored as a new
/// analysis and returned with `201 Created`.
#[instrument(skip(state))]
pub async fn rerun_analysis(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<AnalysisRecord>), ApiError> {
    let original = state
        .storage
        .get_analysis(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("analysis {id}")))?;

    let record =
        analyze_and_record(&state, &original.report, original.location.as_deref()).await?;

    info!(original_id = id, new_id = record.id, "Analysis re-run");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /cases - List disease cases, newest first.
///
/// # Query Parameters
///
/// - `status` (optional): `detected`, `confirmed`, `treated`, `resolved` or `false_positive`
/// - `disease` (optional): exact disease name
/// - `limit` (optional): page size (default: 50, max: 500)
#[instrument(skip(state))]
pub async fn list_cases(
    State(state): State<AppState>,
    Query(query): Query<CasesQuery>,
) -> Result<Json<Vec<DiseaseCase>>, ApiError> {
    let cases = state
        .storage
        .list_cases(query.status, query.disease.as_deref(), clamp_limit(query.limit))
        .await?;

    info!(count = cases.len(), "Cases listed");
    Ok(Json(cases))
}

/// POST /cases - Log a disease case directly.
#[instrument(skip(state, case))]
pub async fn post_case(
    State(state): State<AppState>,
    ApiJson(mut case): ApiJson<NewDiseaseCase>,
) -> Result<(StatusCode, Json<DiseaseCase>), ApiError> {
    surveillance::validate_new_case(&case)?;
    case.disease_name = case.disease_name.trim().to_string();
    case.location = case.location.trim().to_string();

    let stored = state.storage.insert_case(&case, Utc::now()).await?;

    info!(
        case_id = stored.id,
        disease = %stored.disease_name,
        severity = %stored.severity,
        "Disease case logged"
    );
    Ok((StatusCode::CREATED, Json(stored)))
}

/// PATCH /cases/:id - Record a doctor's review of a case.
///
/// # Request Body
///
/// ```json
/// { "status": "confirmed", "severity": "high", "reviewed_by": "dr-lee" }
/// ```
///
/// Every field is optional; omitted fields keep their current value.
#[instrument(skip(state, review))]
pub async fn review_case(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(review): ApiJson<CaseReviewRequest>,
) -> Result<Json<DiseaseCase>, ApiError> {
    let case = state
        .storage
        .review_case(id, &review, Utc::now())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("case {id}")))?;

    info!(case_id = id, status = case.status.as_str(), "Case reviewed");
    Ok(Json(case))
}

/// POST /outbreaks/detect - Run outbreak detection now.
///
/// # Request Body
///
/// ```json
/// { "threshold": 3, "time_window_days": 7 }
/// ```
///
/// Both fields, and the body itself, are optional; the configured defaults
/// fill anything omitted. A body that is present but malformed, such as a
/// negative threshold, is rejected with `400` naming the field.
#[instrument(skip(state, request))]
pub async fn detect_outbreaks(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DetectRequest>,
) -> Result<Json<DetectionReport>, ApiError> {
    let params = DetectionParams {
        threshold: request.threshold.unwrap_or(state.detection.threshold),
        time_window_days: request
            .time_window_days
            .unwrap_or(state.detection.time_window_days),
    };

    let report = surveillance::detect_outbreaks(&state.storage, params, Utc::now())
        .await
        .map_err(|e| {
            warn!(error = %e, retryable = e.is_retryable(), "Outbreak detection failed");
            e
        })?;

    Ok(Json(report))
}

/// GET /outbreaks - List outbreaks, newest first.
///
/// # Query Parameters
///
/// - `active` (optional): when `true`, only detected, confirmed or contained outbreaks
#[instrument(skip(state))]
pub async fn list_outbreaks(
    State(state): State<AppState>,
    Query(query): Query<OutbreaksQuery>,
) -> Result<Json<Vec<Outbreak>>, ApiError> {
    let outbreaks = state
        .storage
        .list_outbreaks(query.active.unwrap_or(false))
        .await?;

    info!(count = outbreaks.len(), "Outbreaks listed");
    Ok(Json(outbreaks))
}

/// GET /outbreaks/:id
#[instrument(skip(state))]
pub async fn get_outbreak(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Outbreak>, ApiError> {
    state
        .storage
        .get_outbreak(id)
        .await?
        .map(Json)
        .ok_or_else(|| SurveillanceError::OutbreakNotFound(id).into())
}

/// PATCH /outbreaks/:id/status - Move an outbreak through its lifecycle.
///
/// Illegal transitions are rejected with `409 Conflict`.
#[instrument(skip(state, request))]
pub async fn update_outbreak_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<OutbreakStatusRequest>,
) -> Result<Json<Outbreak>, ApiError> {
    let outbreak =
        surveillance::change_outbreak_status(&state.storage, id, &request, Utc::now()).await?;
    Ok(Json(outbreak))
}

/// POST /outbreaks/:id/actions - Append an entry to the action log.
#[instrument(skip(state, request))]
pub async fn post_outbreak_action(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<OutbreakActionRequest>,
) -> Result<(StatusCode, Json<Outbreak>), ApiError> {
    let outbreak = surveillance::record_outbreak_action(
        &state.storage,
        id,
        &request.action,
        request.performed_by.as_deref(),
        Utc::now(),
    )
    .await?;

    info!(outbreak_id = id, actions = outbreak.actions.len(), "Outbreak action recorded");
    Ok((StatusCode::CREATED, Json(outbreak)))
}

/// POST /outbreaks/:id/refresh - Recompute an outbreak's statistics.
#[instrument(skip(state))]
pub async fn refresh_outbreak(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Outbreak>, ApiError> {
    let outbreak = surveillance::refresh_statistics(&state.storage, id, Utc::now()).await?;

    info!(
        outbreak_id = id,
        total_cases = outbreak.total_cases,
        severity = %outbreak.severity,
        "Outbreak statistics refreshed"
    );
    Ok(Json(outbreak))
}

/// GET /surveillance/summary - Case counts over recent history.
///
/// # Query Parameters
///
/// - `days` (optional): days of history to cover (default: 30, max: 365)
#[instrument(skip(state))]
pub async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SurveillanceSummary>, ApiError> {
    if !(1..=MAX_WINDOW_DAYS).contains(&query.days) {
        return Err(SurveillanceError::InvalidParameter {
            field: "days",
            reason: format!("must be between 1 and {MAX_WINDOW_DAYS}"),
        }
        .into());
    }

    let now = Utc::now();
    let since = now - chrono::Duration::days(i64::from(query.days));
    let cases = state.storage.cases_between(since, now).await?;
    let active = state.storage.list_outbreaks(true).await?;

    let summary = SurveillanceSummary::from_cases(&cases, query.days, active.len(), now);

    info!(
        days = query.days,
        total_cases = summary.total_cases,
        active_outbreaks = summary.active_outbreaks,
        "Surveillance summary queried"
    );
    Ok(Json(summary))
}

/// GET /symptoms - Every symptom name the rules recognize, sorted.
///
/// Names are in normalized form (`shortness_of_breath`); submissions may use
/// any spelling that normalizes to one of them.
#[instrument(skip(state))]
pub async fn list_symptoms(State(state): State<AppState>) -> Json<Vec<String>> {
    let names: Vec<String> = state.analyzer.rules().known_symptoms().into_iter().collect();
    info!(count = names.len(), "Symptom catalog listed");
    Json(names)
}

/// GET /syndromes - Every syndrome category in match priority order.
#[instrument(skip(state))]
pub async fn list_syndromes(State(state): State<AppState>) -> Json<Vec<SyndromeInfo>> {
    Json(state.analyzer.rules().syndrome_catalog())
}

/// GET /syndromes/:name - Triggers, match threshold and advice for one syndrome.
///
/// # Response
///
/// ```json
/// {
///     "name": "cardiac",
///     "triggers": ["chest_pain", "palpitations", "irregular_heartbeat", "arm_pain", "jaw_pain"],
///     "min_matches": 1,
///     "advice": ["Keep a record of your symptoms and when they occur", "..."],
///     "emergency": true
/// }
/// ```
///
/// Unknown names return `404 Not Found`.
#[instrument(skip(state))]
pub async fn get_syndrome(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SyndromeInfo>, ApiError> {
    state
        .analyzer
        .rules()
        .syndrome_info(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("syndrome '{name}'")))
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
