use axum::{
    extract::{
        multipart::MultipartRejection, rejection::PathRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{MessageResponse, ReceiptData, ReceiptResponse};
use super::repo;
use super::services::{extract_and_store, Upload};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/receipts", get(list_receipts))
        .route("/receipts/:id", delete(delete_receipt))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/extract", post(extract_receipt))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// POST /extract (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn extract_receipt(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ReceiptData>> {
    let mut mp = mp?;
    let mut upload = None;
    while let Some(field) = mp.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let body = field.bytes().await?;
        upload = Some(Upload {
            filename,
            content_type,
            body,
        });
        break;
    }

    let Some(upload) = upload else {
        return Err(AppError::BadRequest("file is required".into()));
    };
    if upload.body.is_empty() {
        return Err(AppError::BadRequest("file is empty".into()));
    }
    info!(filename = %upload.filename, bytes = upload.body.len(), "received file");

    let data = extract_and_store(&state, user_id, upload).await?;
    Ok(Json(data))
}

#[instrument(skip(state))]
pub async fn list_receipts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<ReceiptResponse>>> {
    let rows = repo::list_for_user(&state.db, user_id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(receipt, items)| ReceiptResponse::from_parts(receipt, items))
            .collect(),
    ))
}

#[instrument(skip(state))]
pub async fn delete_receipt(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Path(id) = id?;
    if !repo::delete_for_user(&state.db, id, user_id).await? {
        warn!(%user_id, receipt_id = %id, "delete of missing or foreign receipt");
        return Err(AppError::NotFound("Receipt"));
    }
    info!(%user_id, receipt_id = %id, "receipt deleted");
    Ok(Json(MessageResponse {
        message: "Receipt deleted",
    }))
}
