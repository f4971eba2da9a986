//! Channel operation watchdog for detecting deadlocks
//!
//! Low-overhead monitoring using atomic timestamps instead of locks. Each
//! receiver/sender stores its operation start time in an atomic variable, and
//! the watchdog periodically scans these timestamps to detect blocking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// How long an operation may block before the watchdog reports it.
const BLOCKED_THRESHOLD_MS: u64 = 5000;

/// Timestamp in milliseconds since UNIX_EPOCH
#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Shared state for a single port's operation tracking
struct PortState {
    /// Timestamp (ms since epoch) when current operation started, or 0 if idle
    last_op_start: AtomicU64,
    /// Whether we already warned about this port being blocked
    has_warned: AtomicBool,
    node_name: String,
    port_name: String,
    operation: String, // "recv", "send"
}

/// Handle to a port's watchdog state (held by receiver/sender wrappers)
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<PortState>,
}

impl WatchdogHandle {
    /// Mark the start of a blocking operation (stores current timestamp)
    #[inline(always)]
    pub fn start_operation(&self) {
        self.state
            .last_op_start
            .store(now_millis(), Ordering::Relaxed);
        self.state.has_warned.store(false, Ordering::Relaxed);
    }

    /// Mark the end of a blocking operation (clears timestamp to 0)
    #[inline(always)]
    pub fn finish_operation(&self) {
        if self.state.has_warned.load(Ordering::Relaxed) {
            info!(
                "UNBLOCKED: [{}] {} on port '{}'",
                self.state.node_name, self.state.operation, self.state.port_name
            );
            self.state.has_warned.store(false, Ordering::Relaxed);
        }
        self.state.last_op_start.store(0, Ordering::Relaxed);
    }
}

/// Shared watchdog state
#[derive(Clone)]
pub struct Watchdog {
    ports: Arc<Mutex<Vec<Weak<PortState>>>>,
    enabled: Arc<AtomicBool>,
}

impl Watchdog {
    /// Create a new watchdog
    pub fn new() -> Self {
        Self {
            ports: Arc::new(Mutex::new(Vec::new())),
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Register a new port for monitoring
    pub fn register_port(
        &self,
        node_name: &str,
        operation: &str,
        port_name: &str,
    ) -> WatchdogHandle {
        let state = Arc::new(PortState {
            last_op_start: AtomicU64::new(0),
            has_warned: AtomicBool::new(false),
            node_name: node_name.to_string(),
            port_name: port_name.to_string(),
            operation: operation.to_string(),
        });

        if let Ok(mut ports) = self.ports.lock() {
            ports.push(Arc::downgrade(&state));
        }

        WatchdogHandle { state }
    }

    /// Check all registered ports for operations blocked past the threshold
    pub fn check_for_blocked(&self) {
        let now = now_millis();

        let Ok(mut ports) = self.ports.lock() else {
            return;
        };

        // Drop dead weak references while scanning live ones
        ports.retain(|weak| {
            if let Some(state) = weak.upgrade() {
                let start = state.last_op_start.load(Ordering::Relaxed);
                if start > 0 {
                    let duration_ms = now.saturating_sub(start);
                    if duration_ms > BLOCKED_THRESHOLD_MS
                        && !state.has_warned.swap(true, Ordering::Relaxed)
                    {
                        warn!(
                            "BLOCKED: [{}] {} on port '{}' for {:.1}s",
                            state.node_name,
                            state.operation,
                            state.port_name,
                            duration_ms as f64 / 1000.0
                        );
                    }
                }
                true
            } else {
                false
            }
        });
    }

    /// Start the watchdog monitoring thread
    pub fn start_monitoring_thread(&self) -> std::thread::JoinHandle<()> {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(Duration::from_secs(1));

                if !watchdog.enabled.load(Ordering::Relaxed) {
                    break;
                }

                watchdog.check_for_blocked();
            }
        })
    }

    /// Stop the watchdog monitoring thread
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for tracking an operation - near-zero cost (just atomic stores)
///
/// Uses a reference to avoid Arc cloning overhead.
pub struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline(always)]
    pub fn new(handle: &'a WatchdogHandle) -> Self {
        handle.start_operation();
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        self.handle.finish_operation();
    }
}
