use crate::AppState;
use crate::api::models::analyze::{ErrorResponse, NutritionEstimate};
use crate::errors::{Error, Result};
use crate::inference::{NUTRITION_PROMPT, parse_estimate};
use crate::uploads::TempUpload;
use anyhow::Context;
use axum::{Json, extract::Multipart, extract::State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// MIME type assumed when the upload declares none and the filename gives no hint
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[utoipa::path(
    post,
    path = "/analyze",
    tag = "analyze",
    summary = "Analyze a food photo",
    description = "Upload an image of a dish and receive a structured nutrition estimate. \
                   The image is forwarded to the inference service and never stored beyond the request.",
    request_body(
        content_type = "multipart/form-data",
        description = "Image upload in the `file` field"
    ),
    responses(
        (status = 200, description = "Nutrition estimate for the photographed food", body = NutritionEstimate),
        (status = 400, description = "No file uploaded", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Inference call failed or returned malformed data", body = ErrorResponse)
    )
)]
pub async fn analyze(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<NutritionEstimate>> {
    let mut upload: Option<(TempUpload, String)> = None;

    // Spool the file field to disk as it streams in, checking the size limit
    // incrementally so oversized uploads fail fast
    while let Some(mut field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e),
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let mime_type = resolve_mime(field.content_type(), field.file_name());

        let mut spool = TempUpload::create(&state.config.uploads.dir)
            .await
            .context("failed to create temp upload file")?;

        tracing::debug!(
            path = %spool.path().display(),
            mime_type = %mime_type,
            "Spooling upload"
        );

        let max_file_size = state.config.uploads.max_file_size;
        let mut total_size = 0u64;

        while let Some(chunk) = field.chunk().await.map_err(|e| Error::BadRequest {
            message: format!("Failed to read file chunk: {}", e),
        })? {
            total_size += chunk.len() as u64;
            if total_size > max_file_size {
                tracing::warn!(
                    total_size = total_size,
                    max_file_size = max_file_size,
                    "File size limit exceeded, aborting upload"
                );
                // The spool guard removes the partial file on drop
                return Err(Error::PayloadTooLarge {
                    message: format!(
                        "File size exceeds maximum allowed size of {} bytes ({} MB)",
                        max_file_size,
                        max_file_size / (1024 * 1024)
                    ),
                });
            }
            spool.write_chunk(&chunk).await.context("failed to write temp upload file")?;
        }

        spool.finish().await.context("failed to flush temp upload file")?;
        tracing::info!(
            path = %spool.path().display(),
            bytes = total_size,
            mime_type = %mime_type,
            "Upload received"
        );

        upload = Some((spool, mime_type));
        break;
    }

    let Some((spool, mime_type)) = upload else {
        return Err(Error::MissingUpload);
    };

    // Single deferred cleanup: the temp file is removed after inference on
    // success and on every failure, then the primary result is returned
    let result = run_inference(&state, &spool, &mime_type).await;
    spool.remove().await;
    result.map(Json)
}

/// Pick the MIME type for the inline image: the declared part content type,
/// then a guess from the filename extension, then the jpeg default.
fn resolve_mime(content_type: Option<&str>, file_name: Option<&str>) -> String {
    content_type
        .map(str::to_string)
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
}

async fn run_inference(state: &AppState, spool: &TempUpload, mime_type: &str) -> Result<NutritionEstimate> {
    let bytes = spool.read().await.context("failed to read temp upload file")?;
    let encoded = BASE64.encode(&bytes);

    let text = state.inference.generate_content(mime_type, encoded, NUTRITION_PROMPT).await?;
    let estimate = parse_estimate(&text)?;

    tracing::info!(name = %estimate.name, calories = estimate.calories, "Analysis complete");
    Ok(estimate)
}
