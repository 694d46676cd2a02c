//! STK push result callback reconciliation.
//!
//! The provider posts `{ "Body": { "stkCallback": { ... } } }` once the payer
//! has accepted or declined the prompt. The callback is matched back to the
//! booking whose stored STK request carries the same `CheckoutRequestID`.

use crate::models::{Booking, BookingStatus};
use crate::services::repository::BookingRepository;
use serde_json::{Map, Value};

/// What a callback did to the booking collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No `Body.stkCallback` object in the payload.
    Ignored,
    /// No booking holds the callback's `CheckoutRequestID`.
    Unmatched { checkout_request_id: Option<String> },
    Paid { booking_id: String },
    Failed { booking_id: String },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Ignored => "ignored",
            ReconcileOutcome::Unmatched { .. } => "unmatched",
            ReconcileOutcome::Paid { .. } => "success",
            ReconcileOutcome::Failed { .. } => "failed",
        }
    }
}

/// Fields of a single `stkCallback` object. Absent or mistyped fields read as `None`.
#[derive(Debug)]
pub struct StkResult<'a> {
    pub raw: &'a Value,
    pub merchant_request_id: Option<&'a str>,
    pub checkout_request_id: Option<&'a str>,
    pub result_code: Option<&'a Value>,
    pub result_desc: Option<&'a str>,
}

impl<'a> StkResult<'a> {
    /// Pull the result object out of the provider envelope.
    pub fn from_envelope(payload: &'a Value) -> Option<Self> {
        let raw = payload.get("Body")?.get("stkCallback")?;
        if !raw.is_object() {
            return None;
        }

        Some(Self {
            raw,
            merchant_request_id: raw.get("MerchantRequestID").and_then(Value::as_str),
            checkout_request_id: raw.get("CheckoutRequestID").and_then(Value::as_str),
            result_code: raw.get("ResultCode"),
            result_desc: raw.get("ResultDesc").and_then(Value::as_str),
        })
    }

    /// `ResultCode` 0 (number or numeric string) means the payer completed the payment.
    pub fn is_success(&self) -> bool {
        match self.result_code {
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok() == Some(0.0),
            _ => false,
        }
    }

    /// `CallbackMetadata.Item` flattened from `[{Name, Value}]` into `{Name: Value}`.
    pub fn metadata(&self) -> Map<String, Value> {
        self.raw
            .get("CallbackMetadata")
            .and_then(|m| m.get("Item"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let name = item.get("Name")?.as_str()?;
                        let value = item.get("Value").cloned().unwrap_or(Value::Null);
                        Some((name.to_string(), value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record this result on `booking` and move it to confirmed or failed.
    pub fn apply_to(&self, booking: &mut Booking, now_ms: i64) {
        booking.stk_callback = Some(self.raw.clone());
        booking.merchant_request_id = self.merchant_request_id.map(str::to_string);
        booking.checkout_request_id = self.checkout_request_id.map(str::to_string);
        booking.result_code = self.result_code.cloned();
        booking.result_desc = self.result_desc.map(str::to_string);
        booking.updated_at = Some(now_ms);

        if self.is_success() {
            booking.mpesa = Some(self.metadata());
            booking.paid = true;
            booking.status = BookingStatus::Confirmed;
            booking.confirmed_at = Some(now_ms);
        } else {
            booking.status = BookingStatus::Failed;
        }
    }
}

/// Apply a callback payload to the matching booking, if any.
///
/// Only storage failures are returned as errors; an unmatched or empty
/// callback is a normal outcome.
pub async fn reconcile(
    repository: &BookingRepository,
    payload: &Value,
    now_ms: i64,
) -> anyhow::Result<ReconcileOutcome> {
    let Some(result) = StkResult::from_envelope(payload) else {
        return Ok(ReconcileOutcome::Ignored);
    };

    let Some(checkout_request_id) = result.checkout_request_id else {
        return Ok(ReconcileOutcome::Unmatched {
            checkout_request_id: None,
        });
    };

    let outcome = repository
        .update(|bookings| {
            let booking = bookings
                .iter_mut()
                .find(|b| b.stk_checkout_request_id() == Some(checkout_request_id))?;

            result.apply_to(booking, now_ms);

            Some(if result.is_success() {
                ReconcileOutcome::Paid {
                    booking_id: booking.id.clone(),
                }
            } else {
                ReconcileOutcome::Failed {
                    booking_id: booking.id.clone(),
                }
            })
        })
        .await?;

    Ok(outcome.unwrap_or(ReconcileOutcome::Unmatched {
        checkout_request_id: Some(checkout_request_id.to_string()),
    }))
}
