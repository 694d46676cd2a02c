mod common;

use booking_service::models::BookingStatus;
use booking_service::services::mpesa::{stk_password, STK_PUSH_PATH, TOKEN_PATH};
use common::{mpesa_config, TestApp, TEST_PASSKEY, TEST_SHORTCODE};
use reqwest::{Client, StatusCode};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn mount_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "test-token", "expires_in": "3599" })),
        )
        .mount(server)
        .await;
}

fn accepted_response() -> serde_json::Value {
    json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": "ws_CO_191220191020363925",
        "ResponseCode": "0",
        "ResponseDescription": "Success. Request accepted for processing",
        "CustomerMessage": "Success. Request accepted for processing"
    })
}

#[tokio::test]
async fn stk_push_records_request_on_booking() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PUSH_PATH))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_response()))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::spawn_with_mpesa(mpesa_config(&server.uri())).await;
    let created = app.create_booking(json!({ "name": "a" })).await;
    let id = created["id"].as_str().unwrap();

    let response = Client::new()
        .post(app.url(&format!("/api/bookings/{}/stk", id)))
        .json(&json!({ "phone": "254708374149", "amount": 150 }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["CheckoutRequestID"], "ws_CO_191220191020363925");

    let stored = app.stored_bookings().await;
    assert_eq!(stored[0].status, BookingStatus::StkRequested);
    assert_eq!(
        stored[0].stk_checkout_request_id(),
        Some("ws_CO_191220191020363925")
    );

    // Verify the payload sent to the provider
    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let push = requests
        .iter()
        .find(|r| r.url.path() == STK_PUSH_PATH)
        .expect("STK push request");
    let sent: serde_json::Value = serde_json::from_slice(&push.body).unwrap();

    let timestamp = sent["Timestamp"].as_str().unwrap();
    assert_eq!(timestamp.len(), 14);
    assert!(timestamp.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(
        sent["Password"],
        stk_password(TEST_SHORTCODE, TEST_PASSKEY, timestamp)
    );
    assert_eq!(sent["BusinessShortCode"], TEST_SHORTCODE);
    assert_eq!(sent["Amount"], "150");
    assert_eq!(sent["PartyA"], "254708374149");
    assert_eq!(sent["PhoneNumber"], "254708374149");
    assert_eq!(
        sent["CallBackURL"],
        "https://bookings.example.com/api/mpesa/stk/callback"
    );
    assert!(sent["AccountReference"].as_str().unwrap().contains(id));
    assert!(sent["TransactionDesc"].as_str().unwrap().contains(id));

    app.cleanup().await;
}

#[tokio::test]
async fn missing_phone_or_amount_is_rejected_before_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::spawn_with_mpesa(mpesa_config(&server.uri())).await;
    let created = app.create_booking(json!({ "name": "a" })).await;
    let url = app.url(&format!("/api/bookings/{}/stk", created["id"].as_str().unwrap()));
    let client = Client::new();

    for body in [
        json!({ "amount": 10 }),
        json!({ "phone": "254708374149" }),
        json!({ "phone": "", "amount": 10 }),
        json!({}),
    ] {
        let response = client.post(&url).json(&body).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }

    let stored = app.stored_bookings().await;
    assert_eq!(stored[0].status, BookingStatus::Pending);

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_booking_returns_404() {
    let server = MockServer::start().await;
    let app = TestApp::spawn_with_mpesa(mpesa_config(&server.uri())).await;

    let response = Client::new()
        .post(app.url("/api/bookings/bk_missing/stk"))
        .json(&json!({ "phone": "254708374149", "amount": 10 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(server.received_requests().await.unwrap().is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn missing_provider_settings_is_configuration_error() {
    let app = TestApp::spawn().await;
    let created = app.create_booking(json!({ "name": "a" })).await;

    let response = Client::new()
        .post(app.url(&format!("/api/bookings/{}/stk", created["id"].as_str().unwrap())))
        .json(&json!({ "phone": "254708374149", "amount": 10 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Configuration error");

    app.cleanup().await;
}

#[tokio::test]
async fn provider_rejection_is_echoed() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(STK_PUSH_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "requestId": "11728-2929992-1",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid Amount"
        })))
        .mount(&server)
        .await;

    let app = TestApp::spawn_with_mpesa(mpesa_config(&server.uri())).await;
    let created = app.create_booking(json!({ "name": "a" })).await;

    let response = Client::new()
        .post(app.url(&format!("/api/bookings/{}/stk", created["id"].as_str().unwrap())))
        .json(&json!({ "phone": "254708374149", "amount": "abc" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["details"]["errorCode"], "400.002.02");

    let stored = app.stored_bookings().await;
    assert_eq!(stored[0].status, BookingStatus::Pending);
    assert!(stored[0].stk_request.is_none());

    app.cleanup().await;
}

#[tokio::test]
async fn token_failure_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid credentials"))
        .mount(&server)
        .await;

    let app = TestApp::spawn_with_mpesa(mpesa_config(&server.uri())).await;
    let created = app.create_booking(json!({ "name": "a" })).await;

    let response = Client::new()
        .post(app.url(&format!("/api/bookings/{}/stk", created["id"].as_str().unwrap())))
        .json(&json!({ "phone": "254708374149", "amount": 10 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["details"], "Invalid credentials");

    app.cleanup().await;
}
