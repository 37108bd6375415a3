use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::ApiState;
use crate::error::{PipelineError, GENERIC_FAILURE_MESSAGE};
use crate::orchestrator::RawAnalysisRequest;
use crate::results::{is_clean_identifier, ResultId};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_id: Option<ResultId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl PredictResponse {
    fn success(result_id: ResultId, result: Value) -> Self {
        Self {
            success: true,
            result_id: Some(result_id),
            result: Some(result),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            result_id: None,
            result: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateIdRequest {
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateIdResponse {
    is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ValidateIdResponse {
    fn answer(is_valid: bool) -> Self {
        Self {
            is_valid,
            message: None,
        }
    }

    fn rejected(message: &str) -> Self {
        Self {
            is_valid: false,
            message: Some(message.to_string()),
        }
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation { .. } => StatusCode::BAD_REQUEST,
        PipelineError::InputNotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn read_form(mut multipart: Multipart) -> Result<RawAnalysisRequest, String> {
    let mut raw = RawAnalysisRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "fileUpload" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                // Browsers send an unnamed empty part when no file was chosen
                if !filename.is_empty() {
                    raw.upload = Some((filename, bytes.to_vec()));
                }
            }
            "file" => raw.dataset = Some(field.text().await.map_err(|e| e.to_string())?),
            "alpha" => raw.alpha = Some(field.text().await.map_err(|e| e.to_string())?),
            "clusters" => raw.clusters = Some(field.text().await.map_err(|e| e.to_string())?),
            other => warn!("Ignoring unexpected form field '{}'", other),
        }
    }
    Ok(raw)
}

pub async fn predict(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> (StatusCode, Json<PredictResponse>) {
    let raw = match read_form(multipart).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Malformed prediction form: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PredictResponse::error(GENERIC_FAILURE_MESSAGE.to_string())),
            );
        }
    };

    match state.orchestrator.run(raw).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(PredictResponse::success(
                outcome.record.id,
                outcome.record.prediction,
            )),
        ),
        Err(e) => (status_for(&e), Json(PredictResponse::error(e.user_message()))),
    }
}

pub async fn validate_id(
    State(state): State<ApiState>,
    body: Result<Json<ValidateIdRequest>, JsonRejection>,
) -> (StatusCode, Json<ValidateIdResponse>) {
    let Ok(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidateIdResponse::rejected("Error processing request.")),
        );
    };

    let id = match body.id {
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ValidateIdResponse::rejected("ID is required.")),
            )
        }
    };

    if !is_clean_identifier(&id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidateIdResponse::rejected("Invalid ID format.")),
        );
    }

    (
        StatusCode::OK,
        Json(ValidateIdResponse::answer(state.store.check_valid(&id).await)),
    )
}
