//! Name extraction from certificate images

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};
use certy_extractor::ExtractionResult;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Extracted name candidates
#[derive(Debug, Serialize, ToSchema)]
pub struct ExtractNamesResponse {
    /// OCR text, or a status message when nothing was read
    pub text: String,
    /// Sorted, unique candidate names
    #[schema(example = json!(["Jane Doe", "John Smith"]))]
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<ExtractionResult> for ExtractNamesResponse {
    fn from(result: ExtractionResult) -> Self {
        Self {
            names: result.name_strings(),
            text: result.text,
            warnings: result.warnings,
        }
    }
}

/// Extract recipient name candidates from an image
#[utoipa::path(
    post,
    path = "/extract-names",
    tag = "extraction",
    request_body(content = String, content_type = "multipart/form-data", description = "`image` file and optional `confidence_threshold` in [0, 1]"),
    responses(
        (status = 200, description = "Candidate names", body = ExtractNamesResponse),
        (status = 400, description = "Missing image or bad threshold", body = crate::error::ApiError)
    )
)]
pub async fn extract_names(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut image: Option<Vec<u8>> = None;
    let mut threshold: Option<f32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("multipart error: {e}")))?
    {
        match field.name() {
            Some("image") => {
                image = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("image read error: {e}")))?
                        .to_vec(),
                );
            }
            Some("confidence_threshold") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("threshold read error: {e}")))?;
                let value: f32 = text.trim().parse().map_err(|_| {
                    AppError::BadRequest(format!("invalid confidence_threshold: {text}"))
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(AppError::BadRequest(format!(
                        "confidence_threshold must be between 0 and 1, got {value}"
                    )));
                }
                threshold = Some(value);
            }
            _ => {}
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("No image uploaded".to_string()))?;

    let extractor = Arc::clone(&state.extractor);
    let result = tokio::task::spawn_blocking(move || {
        let threshold = threshold.unwrap_or_else(|| extractor.default_threshold());
        extractor.extract_from_bytes(&image, threshold)
    })
    .await?;

    tracing::info!("Extracted {} name candidates", result.names.len());
    Ok(Json(ExtractNamesResponse::from(result)))
}
