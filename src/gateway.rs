use std::sync::Arc;
use tokio::sync::Mutex;

use crate::transport::{Warehouse, WarehouseSession};

/// Owns the single warehouse session and runs scalar queries through it.
///
/// Failures are absorbed: a failed connect leaves the handle empty (the next
/// call tries again) and a failed query returns `None` without dropping the
/// handle. Calls are serialized on the handle lock.
pub struct QueryGateway {
    backend: Arc<dyn Warehouse>,
    handle: Mutex<Option<WarehouseSession>>,
}

impl QueryGateway {
    pub fn new(backend: Arc<dyn Warehouse>) -> Self {
        Self {
            backend,
            handle: Mutex::new(None),
        }
    }

    /// Opens the session now instead of on the first query.
    pub async fn warm_up(&self) -> bool {
        let mut handle = self.handle.lock().await;
        self.ensure_connected(&mut handle).await
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    async fn ensure_connected(&self, handle: &mut Option<WarehouseSession>) -> bool {
        if handle.is_some() {
            return true;
        }
        match self.backend.connect().await {
            Ok(session) => {
                *handle = Some(session);
                true
            }
            Err(e) => {
                tracing::warn!("Warehouse unavailable, continuing without results: {}", e);
                false
            }
        }
    }

    /// Runs `query` and returns the first column of the first row.
    pub async fn execute_scalar(&self, query: &str) -> Option<String> {
        let mut handle = self.handle.lock().await;
        if !self.ensure_connected(&mut handle).await {
            return None;
        }
        let session = handle.as_ref()?;

        match self.backend.query_scalar(session, query).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Query failed: {}", e);
                None
            }
        }
    }
}
