//! M-Pesa STK push handlers.
//!
//! `initiate_stk_push` asks the provider to prompt the payer's phone;
//! `stk_callback` receives the asynchronous result and reconciles the booking.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use service_core::error::AppError;

use crate::{
    dtos::{CallbackAck, StkPushRequest},
    models::{now_millis, BookingStatus},
    services::{
        metrics,
        reconciler::{self, ReconcileOutcome},
    },
    AppState,
};

/// Start an STK push for a booking.
///
/// Validation runs in this order: `phone`/`amount` present (400), booking
/// exists (404), provider settings present (500). Only then is the provider
/// contacted.
pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload: StkPushRequest = if body.is_empty() {
        StkPushRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e)))?
    };

    let (Some(phone), Some(amount)) = (payload.phone(), payload.amount()) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "phone and amount are required"
        )));
    };

    if state.repository.find_by_id(&booking_id).await.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("Booking not found")));
    }

    state.mpesa.ensure_stk_configured().map_err(|e| {
        tracing::error!(error = %e, "STK push requested but M-Pesa is not configured");
        metrics::record_stk_push("misconfigured");
        AppError::from(e)
    })?;

    tracing::info!(booking_id = %booking_id, amount = %amount, "Initiating STK push");

    let response = state
        .mpesa
        .stk_push(&booking_id, &phone, &amount)
        .await
        .map_err(|e| {
            tracing::error!(booking_id = %booking_id, error = %e, "STK push failed");
            metrics::record_stk_push("rejected");
            AppError::from(e)
        })?;

    metrics::record_stk_push("accepted");

    let stored = state
        .repository
        .update(|bookings| {
            let booking = bookings.iter_mut().find(|b| b.id == booking_id)?;
            booking.stk_request = Some(response.clone());
            booking.status = BookingStatus::StkRequested;
            booking.updated_at = Some(now_millis());
            Some(())
        })
        .await
        .map_err(|e| {
            tracing::error!(booking_id = %booking_id, error = %e, "Failed to record STK request");
            AppError::InternalError(e)
        })?;

    if stored.is_none() {
        tracing::warn!(
            booking_id = %booking_id,
            "Booking disappeared before the STK request could be recorded"
        );
    }

    Ok(Json(response))
}

/// Provider result callback.
///
/// Always acknowledges with `{ResultCode: 0, ResultDesc: "Received"}` so the
/// provider does not retry; only an unparsable body produces a 500.
pub async fn stk_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CallbackAck>, AppError> {
    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse M-Pesa callback body");
            AppError::InternalError(anyhow::anyhow!("Invalid callback payload: {}", e))
        })?
    };

    match reconciler::reconcile(&state.repository, &payload, now_millis()).await {
        Ok(outcome) => {
            metrics::record_callback(outcome.label());
            match &outcome {
                ReconcileOutcome::Ignored => {
                    tracing::debug!("M-Pesa callback without stkCallback body");
                }
                ReconcileOutcome::Unmatched {
                    checkout_request_id,
                } => {
                    tracing::warn!(
                        checkout_request_id = ?checkout_request_id,
                        "No booking matches M-Pesa callback"
                    );
                }
                ReconcileOutcome::Paid { booking_id } => {
                    tracing::info!(booking_id = %booking_id, "M-Pesa payment confirmed");
                }
                ReconcileOutcome::Failed { booking_id } => {
                    tracing::info!(booking_id = %booking_id, "M-Pesa payment failed");
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to record M-Pesa callback");
            metrics::record_callback("error");
        }
    }

    Ok(Json(CallbackAck::received()))
}
