use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{Duration, Utc};
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthUser;
use crate::db::models::{
    Analysis, AnalysisResults, AnalysisStatus, FilePayload, Finding, PatientInfo, Recommendation,
};
use crate::db::queries;
use crate::error::ApiError;

/// Fixed keyword lists backing the dashboard category counts. Matching is
/// a case-insensitive substring test against the free-text diagnosis, so
/// these are pinned literals rather than anything user-configurable.
pub const CANCER_KEYWORDS: &[&str] = &["cancer"];
pub const NEURO_KEYWORDS: &[&str] = &["neuro", "epilepsy", "multiple sclerosis", "alzheimer"];

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;
const WINDOW_HOURS: i64 = 24;

// Raw strings so that a malformed value degrades to the default instead
// of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

/// Pagination inputs, with absent, malformed, or non-positive values
/// falling back to the defaults.
fn page_params(params: &HistoryParams) -> (i64, i64) {
    let parse = |value: &Option<String>, default| {
        value
            .as_deref()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v >= 1)
            .unwrap_or(default)
    };
    (
        parse(&params.page, DEFAULT_PAGE),
        parse(&params.limit, DEFAULT_LIMIT),
    )
}

/// History record in the shape the client consumes: hex `_id`, RFC 3339
/// timestamps, legacy camelCase field names.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisView {
    #[serde(rename = "_id")]
    pub id: String,
    pub file_name: String,
    pub original_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: AnalysisStatus,
    pub results: AnalysisResults,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Analysis> for AnalysisView {
    fn from(analysis: Analysis) -> Self {
        Self {
            id: analysis.id.map(|id| id.to_hex()).unwrap_or_default(),
            file_name: analysis.file_name,
            original_name: analysis.original_name,
            file_type: analysis.file_type,
            file_size: analysis.file_size,
            status: analysis.status,
            results: analysis.results,
            file_path: analysis.file_path,
            file_data: analysis.file_data,
            image_type: analysis.image_type,
            patient_info: analysis.patient_info,
            created_at: analysis.created_at.to_chrono().to_rfc3339(),
            updated_at: analysis.updated_at.to_chrono().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub analyses: Vec<AnalysisView>,
    pub pagination: Pagination,
}

pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let (page, limit) = page_params(&params);
    let (analyses, total) = queries::find_analyses_page(&state.db, auth.id, page, limit).await?;

    Ok(Json(HistoryResponse {
        analyses: analyses.into_iter().map(Into::into).collect(),
        pagination: Pagination {
            page,
            limit,
            total,
            pages: total.div_ceil(limit as u64),
        },
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub today_count: u64,
    pub total_count: u64,
    pub cancer_count: u64,
    pub neuro_count: u64,
}

/// Dashboard aggregates, always derived by live queries. The 24-hour
/// boundary is computed at query time, never stored.
pub async fn category_counts(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CategoryCounts>, ApiError> {
    let since = DateTime::from_chrono(Utc::now() - Duration::hours(WINDOW_HOURS));

    let total_count = queries::count_analyses(&state.db, auth.id).await?;
    let today_count = queries::count_analyses_since(&state.db, auth.id, since).await?;
    let cancer_count =
        queries::count_analyses_matching_diagnosis(&state.db, auth.id, CANCER_KEYWORDS).await?;
    let neuro_count =
        queries::count_analyses_matching_diagnosis(&state.db, auth.id, NEURO_KEYWORDS).await?;

    Ok(Json(CategoryCounts {
        today_count,
        total_count,
        cancer_count,
        neuro_count,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsInput {
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub findings: Option<Vec<Finding>>,
    #[serde(default)]
    pub recommendations: Option<Vec<Recommendation>>,
    #[serde(default)]
    pub processing_time: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub image_type: Option<String>,
    #[serde(default)]
    pub results: Option<ResultsInput>,
    #[serde(default)]
    pub patient_info: Option<PatientInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub analysis_id: String,
}

fn percentage_in_range(value: f64) -> bool {
    (0.0..=100.0).contains(&value)
}

/// The sole domain gate before persistence: only a completed result, one
/// that actually carries a diagnosis, is ever written. Everything else is
/// defaulted or range-checked per the schema.
fn build_results(input: Option<ResultsInput>) -> Result<AnalysisResults, ApiError> {
    let input = input.unwrap_or_default();
    let diagnosis = input
        .diagnosis
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| {
            ApiError::validation("No completed result provided - only completed analyses are stored")
        })?;

    let confidence = input.confidence.unwrap_or(0.0);
    if !percentage_in_range(confidence) {
        return Err(ApiError::validation("Confidence must be between 0 and 100"));
    }

    let findings = input.findings.unwrap_or_default();
    if findings.iter().any(|f| !percentage_in_range(f.confidence)) {
        return Err(ApiError::validation(
            "Finding confidence must be between 0 and 100",
        ));
    }

    let processing_time = input.processing_time.unwrap_or(0.0);
    if processing_time < 0.0 {
        return Err(ApiError::validation("Processing time must be non-negative"));
    }

    Ok(AnalysisResults {
        diagnosis,
        confidence,
        findings,
        recommendations: input.recommendations.unwrap_or_default(),
        processing_time,
    })
}

fn validate_patient(patient: Option<&PatientInfo>) -> Result<(), ApiError> {
    let Some(patient) = patient else {
        return Ok(());
    };
    if patient.name.trim().is_empty() {
        return Err(ApiError::validation("Patient name is required"));
    }
    if !(0..=150).contains(&patient.age) {
        return Err(ApiError::validation("Patient age must be between 0 and 150"));
    }
    Ok(())
}

fn generated_file_name() -> String {
    format!("upload_{}", Utc::now().timestamp_millis())
}

/// Persist one completed analysis for the resolved owner. The record is
/// created exactly once and is immutable afterwards; there is no update
/// or delete surface.
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let results = build_results(body.results)?;
    validate_patient(body.patient_info.as_ref())?;

    let file_name = body
        .file_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(generated_file_name);
    let payload = body
        .file_data
        .filter(|data| !data.is_empty())
        .map(FilePayload::Inline);

    let analysis = Analysis::new(
        auth.id,
        file_name,
        body.file_type.unwrap_or_else(|| "image".to_string()),
        body.file_size.unwrap_or(0),
        body.image_type,
        payload,
        results,
        body.patient_info,
    );

    let id = queries::insert_analysis(&state.db, &analysis).await?;
    tracing::info!("analysis saved: {} for user {}", id.to_hex(), auth.id.to_hex());

    Ok(Json(UploadResponse {
        analysis_id: id.to_hex(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Gender, Severity};

    fn completed(diagnosis: &str) -> Option<ResultsInput> {
        Some(ResultsInput {
            diagnosis: Some(diagnosis.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_page_params_default_when_absent_or_invalid() {
        let defaults = page_params(&HistoryParams::default());
        assert_eq!(defaults, (1, 10));

        let zeroed = page_params(&HistoryParams {
            page: Some("0".to_string()),
            limit: Some("-3".to_string()),
        });
        assert_eq!(zeroed, (1, 10));

        let garbage = page_params(&HistoryParams {
            page: Some("abc".to_string()),
            limit: Some("".to_string()),
        });
        assert_eq!(garbage, (1, 10));

        let explicit = page_params(&HistoryParams {
            page: Some("3".to_string()),
            limit: Some("25".to_string()),
        });
        assert_eq!(explicit, (3, 25));
    }

    #[test]
    fn test_page_count_is_a_ceiling() {
        // 25 records at limit 10 span pages 1..=3.
        assert_eq!(25u64.div_ceil(10), 3);
        assert_eq!(30u64.div_ceil(10), 3);
        assert_eq!(0u64.div_ceil(10), 0);
    }

    #[test]
    fn test_missing_or_empty_diagnosis_is_rejected() {
        assert!(build_results(None).is_err());
        assert!(build_results(Some(ResultsInput::default())).is_err());
        assert!(
            build_results(Some(ResultsInput {
                diagnosis: Some("   ".to_string()),
                ..Default::default()
            }))
            .is_err()
        );
    }

    #[test]
    fn test_completed_result_gets_schema_defaults() {
        let results = build_results(completed("Suspected Lung Cancer")).unwrap();
        assert_eq!(results.diagnosis, "Suspected Lung Cancer");
        assert_eq!(results.confidence, 0.0);
        assert!(results.findings.is_empty());
        assert!(results.recommendations.is_empty());
        assert_eq!(results.processing_time, 0.0);
    }

    #[test]
    fn test_out_of_range_results_are_rejected() {
        let over_confident = ResultsInput {
            diagnosis: Some("Glioma".to_string()),
            confidence: Some(120.0),
            ..Default::default()
        };
        assert!(build_results(Some(over_confident)).is_err());

        let negative_time = ResultsInput {
            diagnosis: Some("Glioma".to_string()),
            processing_time: Some(-1.0),
            ..Default::default()
        };
        assert!(build_results(Some(negative_time)).is_err());

        let bad_finding = ResultsInput {
            diagnosis: Some("Glioma".to_string()),
            findings: Some(vec![Finding {
                kind: "mass".to_string(),
                description: "left hemisphere".to_string(),
                severity: Severity::High,
                confidence: 101.0,
            }]),
            ..Default::default()
        };
        assert!(build_results(Some(bad_finding)).is_err());
    }

    fn patient(age: i32) -> PatientInfo {
        PatientInfo {
            name: "Jane Doe".to_string(),
            age,
            gender: Gender::Female,
            patient_id: None,
            contact_number: None,
            email: None,
            address: None,
            medical_history: None,
            symptoms: None,
            referring_doctor: None,
            doctor_id: None,
        }
    }

    #[test]
    fn test_patient_age_bounds() {
        assert!(validate_patient(Some(&patient(0))).is_ok());
        assert!(validate_patient(Some(&patient(150))).is_ok());
        assert!(validate_patient(Some(&patient(151))).is_err());
        assert!(validate_patient(Some(&patient(-1))).is_err());
        assert!(validate_patient(None).is_ok());
    }

    #[test]
    fn test_view_timestamps_render_as_rfc3339() {
        use mongodb::bson::oid::ObjectId;

        let analysis = Analysis::new(
            ObjectId::new(),
            "scan.png".to_string(),
            "image".to_string(),
            2048,
            Some("MRI".to_string()),
            None,
            build_results(completed("Glioma")).unwrap(),
            None,
        );

        let view = AnalysisView::from(analysis);
        assert!(chrono::DateTime::parse_from_rfc3339(&view.created_at).is_ok());
        assert_eq!(view.created_at, view.updated_at);
    }

    #[test]
    fn test_window_boundary_is_24_hours_back() {
        let now = Utc::now();
        let since = DateTime::from_chrono(now - Duration::hours(WINDOW_HOURS));
        let elapsed = now - since.to_chrono();
        assert_eq!(elapsed.num_hours(), 24);
    }

    #[test]
    fn test_generated_file_name_has_upload_prefix() {
        assert!(generated_file_name().starts_with("upload_"));
    }

    #[test]
    fn test_keyword_fixtures_are_pinned() {
        assert_eq!(CANCER_KEYWORDS, &["cancer"]);
        assert_eq!(
            NEURO_KEYWORDS,
            &["neuro", "epilepsy", "multiple sclerosis", "alzheimer"]
        );
    }

    #[test]
    fn test_example_diagnoses_land_in_one_category_each() {
        // Mirrors the store-side case-insensitive substring match.
        let matches = |diagnosis: &str, keywords: &[&str]| {
            let lower = diagnosis.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        };

        assert!(matches("Suspected Lung Cancer", CANCER_KEYWORDS));
        assert!(!matches("Suspected Lung Cancer", NEURO_KEYWORDS));

        assert!(matches("Epilepsy - seizure detected", NEURO_KEYWORDS));
        assert!(!matches("Epilepsy - seizure detected", CANCER_KEYWORDS));
    }

    #[test]
    fn test_upload_request_accepts_legacy_wire_names() {
        let body: UploadRequest = serde_json::from_str(
            r#"{
                "fileName": "scan.png",
                "fileType": "image",
                "fileSize": 2048,
                "imageType": "MRI",
                "fileData": "data:image/png;base64,AAAA",
                "results": {
                    "diagnosis": "Glioma",
                    "confidence": 87.2,
                    "processingTime": 3.1
                },
                "patientInfo": { "name": "Jane Doe", "age": 44, "gender": "Female" }
            }"#,
        )
        .unwrap();

        assert_eq!(body.file_name.as_deref(), Some("scan.png"));
        assert_eq!(body.file_size, Some(2048));
        let results = build_results(body.results).unwrap();
        assert_eq!(results.confidence, 87.2);
        assert_eq!(results.processing_time, 3.1);
        assert!(validate_patient(body.patient_info.as_ref()).is_ok());
    }
}
