pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

use std::sync::Arc;

use config::BookingConfig;
use services::{BookingRepository, MpesaClient, Storage};

pub use startup::Application;

#[derive(Clone)]
pub struct AppState {
    pub config: BookingConfig,
    pub repository: BookingRepository,
    pub storage: Arc<dyn Storage>,
    pub mpesa: MpesaClient,
}
