//! # Application State Management
//!
//! Shared state accessed by every connection: the configuration, the loaded
//! recognizer model, the user-id counter, and gateway metrics.
//!
//! ## Thread Safety Pattern:
//! All mutable pieces sit behind `Arc` so the state can be cloned into each
//! actix worker. The model context is immutable after load; the user-id
//! counter is a lock-free atomic; metrics use an `RwLock` because they are
//! read far more rarely than they are written.

use crate::config::AppConfig;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use whisper_rs::WhisperContext;

/// The main application state shared across all connections.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration (session parameters are copied out at accept time)
    config: Arc<RwLock<AppConfig>>,

    /// The loaded recognizer model, shared by every session
    whisper: Arc<WhisperContext>,

    /// Monotonically increasing connection identifier.
    /// Overflow wraps silently, which is acceptable for an identifier.
    next_user_id: Arc<AtomicI32>,

    /// Gateway-wide connection metrics
    metrics: Arc<RwLock<GatewayMetrics>>,

    /// When the server started
    start_time: Instant,
}

/// Connection metrics collected across the gateway's lifetime.
#[derive(Debug, Default, Clone)]
pub struct GatewayMetrics {
    /// Total number of WebSocket connections accepted since startup
    pub connections_opened: u64,

    /// Current number of live streaming sessions
    pub active_sessions: u32,
}

impl AppState {
    pub fn new(config: AppConfig, whisper: Arc<WhisperContext>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            whisper,
            next_user_id: Arc::new(AtomicI32::new(1)),
            metrics: Arc::new(RwLock::new(GatewayMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately so other connections aren't
    /// blocked while the caller works with the snapshot.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Shared handle to the loaded recognizer model.
    pub fn whisper(&self) -> &Arc<WhisperContext> {
        &self.whisper
    }

    /// Allocate the next connection identifier.
    pub fn allocate_user_id(&self) -> i32 {
        self.next_user_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a newly accepted connection.
    pub fn record_connection_opened(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.connections_opened += 1;
        metrics.active_sessions += 1;
    }

    /// Record a closed connection.
    pub fn record_connection_closed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Get a snapshot of current metrics for logging.
    pub fn get_metrics_snapshot(&self) -> GatewayMetrics {
        self.metrics.read().unwrap().clone()
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
