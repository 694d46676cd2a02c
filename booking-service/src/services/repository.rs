//! Booking persistence backed by a single JSON document.
//!
//! Every operation reads the whole collection and writes the whole collection
//! back. Mutations go through [`BookingRepository::update`], which holds a
//! process-wide lock across the read-modify-write so concurrent handlers
//! cannot clobber each other.

use crate::models::Booking;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct BookingRepository {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl BookingRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Parse the document. A missing or blank document is an empty collection;
    /// any other read or parse failure is an error.
    async fn load(&self) -> Result<Vec<Booking>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Read every booking.
    ///
    /// A missing, empty, or unparsable document reads as an empty collection.
    pub async fn read_all(&self) -> Vec<Booking> {
        match self.load().await {
            Ok(bookings) => bookings,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = ?e,
                    "Bookings document unreadable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Overwrite the document with `bookings`.
    pub async fn write_all(&self, bookings: &[Booking]) -> Result<()> {
        let body = serde_json::to_string_pretty(bookings)?;
        fs::write(&self.path, body)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Run `f` against the full collection under the write lock, then persist.
    ///
    /// Nothing is written when `f` returns `None`. A document that exists but
    /// cannot be read or parsed fails the update and is left untouched.
    pub async fn update<F, T>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Vec<Booking>) -> Option<T>,
    {
        let _guard = self.write_lock.lock().await;

        let mut bookings = self.load().await?;
        let result = f(&mut bookings);
        if result.is_some() {
            self.write_all(&bookings).await?;
        }

        Ok(result)
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Booking> {
        self.read_all().await.into_iter().find(|b| b.id == id)
    }
}
