use async_trait::async_trait;
use rand::Rng;
use service_core::error::AppError;
use std::path::{Path, PathBuf};
use tokio::fs;

/// URL prefix under which stored uploads are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        fs::write(path, data).await?;
        Ok(())
    }
}

/// `<ms>-<random>` plus the extension of `original_name`, if it has one.
pub fn generate_upload_name(original_name: &str, now_ms: i64) -> String {
    let unique: u32 = rand::thread_rng().gen_range(0..=1_000_000_000);
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    format!("{}-{}{}", now_ms, unique, extension)
}

pub fn public_upload_path(key: &str) -> String {
    format!("{}/{}", UPLOADS_URL_PREFIX, key)
}
