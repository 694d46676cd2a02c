use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::NewBooking;

/// Body of `POST /api/bookings/:id/stk`. Both fields accept strings or numbers.
#[derive(Debug, Deserialize, Default)]
pub struct StkPushRequest {
    #[serde(default)]
    pub phone: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
}

impl StkPushRequest {
    pub fn phone(&self) -> Option<String> {
        present(self.phone.as_ref())
    }

    pub fn amount(&self) -> Option<String> {
        present(self.amount.as_ref())
    }
}

/// Text form of a value, forwarded as given. Missing, `null`, `false`, `""`
/// and `0` count as absent; anything else is present.
fn present(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// JSON alternative to the multipart booking form. No screenshot can be attached this way.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CreateBookingBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub stroke: Option<String>,
    pub date: Option<String>,
    pub message: Option<String>,
    pub paid: Option<Value>,
}

impl From<CreateBookingBody> for NewBooking {
    fn from(body: CreateBookingBody) -> Self {
        NewBooking {
            name: body.name.unwrap_or_default(),
            email: body.email.unwrap_or_default(),
            phone: body.phone.unwrap_or_default(),
            stroke: body.stroke.unwrap_or_default(),
            date: body.date.unwrap_or_default(),
            message: body.message.unwrap_or_default(),
            paid: matches!(body.paid, Some(Value::Bool(true)))
                || matches!(body.paid.as_ref().and_then(Value::as_str), Some("true")),
            screenshot: None,
        }
    }
}

/// Fixed acknowledgment the provider expects from a callback endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackAck {
    pub result_code: i32,
    pub result_desc: String,
}

impl CallbackAck {
    pub fn received() -> Self {
        Self {
            result_code: 0,
            result_desc: "Received".to_string(),
        }
    }
}
