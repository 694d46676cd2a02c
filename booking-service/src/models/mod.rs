use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const BOOKING_ID_PREFIX: &str = "bk_";

/// A customer booking as persisted in the bookings document.
///
/// Field names are camelCase on the wire; timestamps are epoch milliseconds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub stroke: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,

    /// Raw STK push response; holds the `CheckoutRequestID` used to match callbacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stk_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stk_callback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpesa: Option<Map<String, Value>>,

    /// Fields this service does not model, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Booking lifecycle state. Values written by other tools are kept verbatim
/// in `Other`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(from = "Value", into = "Value")]
pub enum BookingStatus {
    #[default]
    Pending,
    StkRequested,
    Confirmed,
    Failed,
    Other(Value),
}

impl From<Value> for BookingStatus {
    fn from(value: Value) -> Self {
        match value.as_str() {
            Some("pending") => BookingStatus::Pending,
            Some("stk_requested") => BookingStatus::StkRequested,
            Some("confirmed") => BookingStatus::Confirmed,
            Some("failed") => BookingStatus::Failed,
            _ => BookingStatus::Other(value),
        }
    }
}

impl From<BookingStatus> for Value {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending => Value::from("pending"),
            BookingStatus::StkRequested => Value::from("stk_requested"),
            BookingStatus::Confirmed => Value::from("confirmed"),
            BookingStatus::Failed => Value::from("failed"),
            BookingStatus::Other(value) => value,
        }
    }
}

/// Form fields accepted when a booking is created.
#[derive(Debug, Default, Clone)]
pub struct NewBooking {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub stroke: String,
    pub date: String,
    pub message: String,
    pub paid: bool,
    pub screenshot: Option<String>,
}

impl Booking {
    pub fn new(id: String, input: NewBooking, now_ms: i64) -> Self {
        Self {
            id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            stroke: input.stroke,
            date: input.date,
            message: input.message,
            paid: input.paid,
            screenshot: input.screenshot,
            status: BookingStatus::Pending,
            created_at: Some(now_ms),
            confirmed_at: None,
            updated_at: None,
            stk_request: None,
            stk_callback: None,
            merchant_request_id: None,
            checkout_request_id: None,
            result_code: None,
            result_desc: None,
            mpesa: None,
            extra: Map::new(),
        }
    }

    /// `CheckoutRequestID` returned by the provider when the STK push was accepted.
    pub fn stk_checkout_request_id(&self) -> Option<&str> {
        self.stk_request
            .as_ref()
            .and_then(|r| r.get("CheckoutRequestID"))
            .and_then(Value::as_str)
    }

    pub fn confirm(&mut self, now_ms: i64) {
        self.status = BookingStatus::Confirmed;
        self.confirmed_at = Some(now_ms);
    }
}

/// Id for a booking created at `now_ms`, bumped forward until it does not
/// collide with an id already in `existing`.
pub fn next_booking_id(existing: &[Booking], now_ms: i64) -> String {
    let mut ts = now_ms;
    loop {
        let candidate = format!("{}{}", BOOKING_ID_PREFIX, ts);
        if !existing.iter().any(|b| b.id == candidate) {
            return candidate;
        }
        ts += 1;
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
