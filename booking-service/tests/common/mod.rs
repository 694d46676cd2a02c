#![allow(dead_code)]

use booking_service::config::{BookingConfig, MpesaConfig, MpesaEnvironment, StorageConfig};
use booking_service::models::Booking;
use booking_service::startup::Application;
use booking_service::AppState;
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::path::PathBuf;
use uuid::Uuid;

pub const TEST_SHORTCODE: &str = "174379";
pub const TEST_PASSKEY: &str = "test-passkey";
pub const TEST_CALLBACK_BASE: &str = "https://bookings.example.com";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub state: AppState,
    pub root: PathBuf,
    pub data_file: PathBuf,
    pub upload_dir: PathBuf,
}

/// M-Pesa settings pointing at `base_url` (usually a wiremock server).
pub fn mpesa_config(base_url: &str) -> MpesaConfig {
    let mut mpesa = MpesaConfig::new(MpesaEnvironment::Sandbox);
    mpesa.api_base_url = base_url.to_string();
    mpesa.consumer_key = Some("test-consumer-key".to_string());
    mpesa.consumer_secret = Some(Secret::new("test-consumer-secret".to_string()));
    mpesa.shortcode = Some(TEST_SHORTCODE.to_string());
    mpesa.passkey = Some(Secret::new(TEST_PASSKEY.to_string()));
    mpesa.callback_base_url = Some(TEST_CALLBACK_BASE.to_string());
    mpesa
}

impl TestApp {
    /// Spawn with no M-Pesa credentials.
    pub async fn spawn() -> Self {
        Self::spawn_with_mpesa(MpesaConfig::new(MpesaEnvironment::Sandbox)).await
    }

    pub async fn spawn_with_mpesa(mpesa: MpesaConfig) -> Self {
        let root = PathBuf::from(format!("target/test-bookings-{}", Uuid::new_v4()));
        let data_file = root.join("bookings.json");
        let upload_dir = root.join("uploads");

        let config = BookingConfig {
            common: CoreConfig {
                port: 0, // Random port
                ..CoreConfig::default()
            },
            storage: StorageConfig {
                data_file: data_file.clone(),
                upload_dir: upload_dir.clone(),
            },
            mpesa,
            service_name: "booking-service-test".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let state = app.state();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            state,
            root,
            data_file,
            upload_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Bookings as currently persisted on disk.
    pub async fn stored_bookings(&self) -> Vec<Booking> {
        self.state.repository.read_all().await
    }

    /// Write a booking straight to the store, bypassing the API.
    pub async fn seed(&self, booking: Booking) {
        self.state
            .repository
            .update(|bookings| {
                bookings.push(booking);
                Some(())
            })
            .await
            .expect("Failed to seed booking");
    }

    /// Create a booking through the API using a JSON body.
    pub async fn create_booking(&self, body: serde_json::Value) -> serde_json::Value {
        let response = reqwest::Client::new()
            .post(self.url("/api/bookings"))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");
        assert!(response.status().is_success());
        response.json().await.expect("Failed to parse JSON")
    }

    /// Cleanup the data file and uploads directory.
    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.root).await;
    }
}
