use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Path, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};

use crate::{
    auth::{self, AdminClaims},
    batches,
    database::ping,
    error::AppError,
    models::{BatchWithOwner, TicketBatch},
    payloads::{LoginRequest, RegisterRequest, ReservationRequest, ResetPasswordRequest},
    payments,
    state::AppState,
};

pub const PROOF_FIELD: &str = "image";

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|_| AppError::MalformedPayload)
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id).map_err(|_| AppError::MalformedPayload)
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Result<&'static str, AppError> {
    ping(&state.pool).await?;

    Ok("ok")
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user = body(payload)?.validate()?;
    auth::register(&state.pool, &state.auth, user).await?;

    Ok((StatusCode::CREATED, message("User registered")))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let credentials = body(payload)?.validate()?;
    let (token, user) = auth::login(&state.pool, &state.auth, credentials).await?;

    Ok(Json(json!({
        "message": "Logged in",
        "token": token,
        "user": user,
    })))
}

pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let credentials = body(payload)?.validate()?;
    auth::reset_password(&state.pool, &state.auth, credentials).await?;

    Ok(message("Password updated"))
}

pub async fn reserve_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let reservation = body(payload)?.validate()?;

    batches::create(
        &state.pool,
        reservation.owner_id,
        &reservation.numbers,
        reservation.total_amount,
    )
    .await?;

    Ok(message("Numbers saved"))
}

pub async fn settle_handler(
    AdminClaims(_admin): AdminClaims,
    State(state): State<Arc<AppState>>,
    batch_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    payments::settle(&state.pool, path_id(batch_id)?).await?;

    Ok(message("Payment updated"))
}

pub async fn proof_handler(
    State(state): State<Arc<AppState>>,
    batch_id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    let batch_id = path_id(batch_id)?;
    let mut multipart = multipart.map_err(|_| AppError::MalformedPayload)?;
    let mut upload: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::MalformedPayload)?
    {
        if field.name() != Some(PROOF_FIELD) {
            continue;
        }

        if upload.is_some() {
            return Err(AppError::validation("Exactly one image is required"));
        }

        if field
            .content_type()
            .is_some_and(|content_type| !content_type.starts_with("image/"))
        {
            return Err(AppError::validation("Only image uploads are accepted"));
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|_| AppError::MalformedPayload)?;

        if bytes.is_empty() {
            return Err(AppError::validation("Image is empty"));
        }

        upload = Some((file_name, bytes));
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::validation("Exactly one image is required"))?;

    let image_ref = payments::intake(
        &state.pool,
        &state.proofs,
        batch_id,
        file_name.as_deref(),
        &bytes,
    )
    .await?;

    Ok(Json(json!({
        "message": "Proof uploaded and status updated",
        "imageRef": image_ref,
    })))
}

pub async fn list_by_owner_handler(
    State(state): State<Arc<AppState>>,
    owner_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<TicketBatch>>, AppError> {
    let owner_id = path_id(owner_id)?;

    Ok(Json(batches::list_by_owner(&state.pool, owner_id).await?))
}

pub async fn list_all_handler(
    AdminClaims(_admin): AdminClaims,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BatchWithOwner>>, AppError> {
    Ok(Json(batches::list_all(&state.pool).await?))
}
