//! Schema Registry
//!
//! Owns the current snapshot and replaces it wholesale on reload. Readers take
//! an `Arc` handle and keep it for the whole request, so a reload never shows
//! them a half-built state.

use crate::error::{RegistryError, Result};
use crate::registry::snapshot::{LoadReport, RegistrySnapshot};
use crate::registry::source::DocumentSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

pub struct SchemaRegistry {
    source: DocumentSource,
    platforms: Vec<String>,
    refresh_interval: Duration,
    current: RwLock<Option<Arc<RegistrySnapshot>>>,
    last_reload: RwLock<Option<Instant>>,
    reload_lock: Mutex<()>,
}

impl SchemaRegistry {
    pub fn new(source: DocumentSource, platforms: Vec<String>, refresh_interval: Duration) -> Self {
        Self {
            source,
            platforms,
            refresh_interval,
            current: RwLock::new(None),
            last_reload: RwLock::new(None),
            reload_lock: Mutex::new(()),
        }
    }

    /// Initial load. Same as `reload`, kept for call-site readability.
    pub async fn initialize(&self) -> Result<LoadReport> {
        info!("Initializing schema registry from {}", self.source.describe());
        self.reload().await
    }

    /// Build a fresh snapshot and swap it in. On failure the previous
    /// snapshot stays active.
    pub async fn reload(&self) -> Result<LoadReport> {
        let _guard = self.reload_lock.lock().await;

        let source = self.source.clone();
        let platforms = self.platforms.clone();
        let contents = tokio::task::spawn_blocking(move || source.read_documents(&platforms))
            .await
            .map_err(|e| RegistryError::SourceUnreadable {
                cause: format!("document reader task failed: {}", e),
            })
            .and_then(|result| result)
            .map_err(|e| {
                error!("Schema reload failed, keeping previous snapshot: {}", e);
                e
            })?;

        let snapshot = RegistrySnapshot::build(contents);

        if let Err(e) = snapshot.check_minimum_structure() {
            error!("Schema reload rejected, keeping previous snapshot: {}", e);
            return Err(e);
        }

        for skipped in snapshot.skipped() {
            warn!("Skipped schema document {}: {}", skipped.origin, skipped.reason);
        }

        snapshot.log_summary();
        let report = snapshot.report();

        *self.current.write().await = Some(Arc::new(snapshot));
        *self.last_reload.write().await = Some(Instant::now());

        Ok(report)
    }

    /// Reload only when the refresh interval has elapsed.
    pub async fn reload_if_stale(&self) -> Option<Result<LoadReport>> {
        if self.needs_reload().await {
            Some(self.reload().await)
        } else {
            None
        }
    }

    /// Handle to the current snapshot for the duration of one request
    pub async fn snapshot(&self) -> Result<Arc<RegistrySnapshot>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(RegistryError::Unavailable)
    }

    pub async fn needs_reload(&self) -> bool {
        match *self.last_reload.read().await {
            Some(at) => at.elapsed() > self.refresh_interval,
            None => true,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
