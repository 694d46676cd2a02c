pub mod metrics;
pub mod mpesa;
pub mod reconciler;
pub mod repository;
pub mod storage;

pub use metrics::{get_metrics, init_metrics};
pub use mpesa::MpesaClient;
pub use repository::BookingRepository;
pub use storage::{LocalStorage, Storage};
