//! Booking handlers: create (with optional screenshot), list, confirm.

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::header::CONTENT_TYPE,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::CreateBookingBody,
    models::{next_booking_id, now_millis, Booking, NewBooking},
    services::{
        metrics,
        storage::{generate_upload_name, public_upload_path},
    },
    AppState,
};

/// Multipart form field carrying the optional payment screenshot.
const SCREENSHOT_FIELD: &str = "screenshot";

/// Create a booking.
///
/// Accepts `multipart/form-data` (text fields plus an optional `screenshot`
/// file) or a JSON object with the same text fields.
pub async fn create_booking(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Booking>, AppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let input = if is_multipart {
        let multipart = Multipart::from_request(request, &state).await.map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e))
        })?;
        read_booking_form(&state, multipart).await?
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read body: {}", e)))?;
        if body.is_empty() {
            NewBooking::default()
        } else {
            let body: CreateBookingBody = serde_json::from_slice(&body)
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e)))?;
            body.into()
        }
    };

    let booking = state
        .repository
        .update(|bookings| {
            let now = now_millis();
            let booking = Booking::new(next_booking_id(bookings, now), input, now);
            bookings.push(booking.clone());
            Some(booking)
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to save booking");
            AppError::InternalError(e)
        })?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Booking was not saved")))?;

    metrics::record_booking_created();
    tracing::info!(
        booking_id = %booking.id,
        has_screenshot = booking.screenshot.is_some(),
        paid = booking.paid,
        "Booking created"
    );

    Ok(Json(booking))
}

async fn read_booking_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<NewBooking, AppError> {
    let mut input = NewBooking::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();

        if name == SCREENSHOT_FIELD {
            let Some(original_name) = field.file_name().map(str::to_string) else {
                continue;
            };
            if input.screenshot.is_some() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only one screenshot may be attached"
                )));
            }

            let data = field
                .bytes()
                .await
                .map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e))
                })?
                .to_vec();

            let key = generate_upload_name(&original_name, now_millis());
            let size = data.len();
            state.storage.upload(&key, data).await.map_err(|e| {
                tracing::error!("Failed to store screenshot {}: {}", key, e);
                e
            })?;

            tracing::debug!(key = %key, size = size, "Screenshot stored");
            input.screenshot = Some(public_upload_path(&key));
            continue;
        }

        let value = field.text().await.map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Failed to read field {}: {}", name, e))
        })?;

        match name.as_str() {
            "name" => input.name = value,
            "email" => input.email = value,
            "phone" => input.phone = value,
            "stroke" => input.stroke = value,
            "date" => input.date = value,
            "message" => input.message = value,
            "paid" => input.paid = value == "true",
            _ => {}
        }
    }

    Ok(input)
}

/// List every booking, unfiltered.
pub async fn list_bookings(State(state): State<AppState>) -> Json<Vec<Booking>> {
    Json(state.repository.read_all().await)
}

/// Mark a booking confirmed. Repeating the call re-stamps `confirmedAt`.
pub async fn confirm_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .repository
        .update(|bookings| {
            let booking = bookings.iter_mut().find(|b| b.id == booking_id)?;
            booking.confirm(now_millis());
            Some(booking.clone())
        })
        .await
        .map_err(|e| {
            tracing::error!(booking_id = %booking_id, error = %e, "Failed to confirm booking");
            AppError::InternalError(e)
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Not found")))?;

    metrics::record_booking_confirmed();
    tracing::info!(booking_id = %booking.id, "Booking confirmed");

    Ok(Json(booking))
}
