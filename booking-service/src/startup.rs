//! Application startup and lifecycle management.

use crate::config::BookingConfig;
use crate::handlers::{self, bookings, mpesa};
use crate::services::{storage::UPLOADS_URL_PREFIX, BookingRepository, LocalStorage, MpesaClient};
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::{request_id_middleware, request_id_of},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    upload_dir: PathBuf,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BookingConfig) -> Result<Self, AppError> {
        if let Some(parent) = config
            .storage
            .data_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                tracing::error!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                );
                AppError::from(e)
            })?;
        }

        let repository = BookingRepository::new(config.storage.data_file.clone());

        let storage = LocalStorage::new(config.storage.upload_dir.clone())
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to prepare upload directory {}: {}",
                    config.storage.upload_dir.display(),
                    e
                );
                e
            })?;
        let upload_dir = storage.base_path().to_path_buf();

        let mpesa = MpesaClient::new(config.mpesa.clone());
        if mpesa.is_configured() {
            tracing::info!(
                environment = ?config.mpesa.environment,
                "M-Pesa client initialized"
            );
        } else {
            tracing::warn!("M-Pesa credentials not configured - STK push will be unavailable");
        }

        let state = AppState {
            config: config.clone(),
            repository,
            storage: Arc::new(storage),
            mpesa,
        };

        // Port 0 binds a random port (used by tests)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            data_file = %config.storage.data_file.display(),
            upload_dir = %upload_dir.display(),
            "Booking service: HTTP on port {}",
            port
        );

        Ok(Self {
            port,
            listener,
            state,
            upload_dir,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state, self.upload_dir);
        axum::serve(self.listener, router).await
    }
}

pub fn build_router(state: AppState, upload_dir: PathBuf) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Screenshots are not size-limited
        .route(
            "/api/bookings",
            post(bookings::create_booking)
                .layer(DefaultBodyLimit::disable())
                .get(bookings::list_bookings),
        )
        .route("/api/bookings/:id/confirm", put(bookings::confirm_booking))
        .route("/api/bookings/:id/stk", post(mpesa::initiate_stk_push))
        .route("/api/mpesa/stk/callback", post(mpesa::stk_callback))
        .nest_service(UPLOADS_URL_PREFIX, ServeDir::new(upload_dir))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    request_id = %request_id_of(request),
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Outside the trace layer so spans carry the generated id
        .layer(from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
