use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters for one order-tracking session.
#[derive(Debug)]
pub struct SessionMetrics {
    // Inbound
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    orphan_messages: AtomicU64,
    protocol_errors: AtomicU64,

    // Outbound
    requests_sent: AtomicU64,
    request_timeouts: AtomicU64,
    transport_errors: AtomicU64,

    // Reconciliation
    fills_applied: AtomicU64,
    duplicate_fills: AtomicU64,
    rejected_fills: AtomicU64,

    // Connection
    reconnect_attempts: AtomicU64,
    reconnect_successes: AtomicU64,

    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_frame_time: Option<Instant>,
    last_fill_time: Option<Instant>,
    last_error_time: Option<Instant>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            orphan_messages: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            requests_sent: AtomicU64::new(0),
            request_timeouts: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            fills_applied: AtomicU64::new(0),
            duplicate_fills: AtomicU64::new(0),
            rejected_fills: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_successes: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_frame_time: None,
                last_fill_time: None,
                last_error_time: None,
            }),
        }
    }

    fn mark_error(&self) {
        self.inner.write().last_error_time = Some(Instant::now());
    }

    // --- Increment methods ---

    pub fn inc_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_frame_time = Some(Instant::now());
    }

    pub fn inc_malformed_frames(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
        self.mark_error();
    }

    pub fn inc_orphan_messages(&self) {
        self.orphan_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_protocol_errors(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        self.mark_error();
    }

    pub fn inc_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_request_timeouts(&self) {
        self.request_timeouts.fetch_add(1, Ordering::Relaxed);
        self.mark_error();
    }

    pub fn inc_transport_errors(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        self.mark_error();
    }

    pub fn inc_fills_applied(&self) {
        self.fills_applied.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_fill_time = Some(Instant::now());
    }

    pub fn inc_duplicate_fills(&self) {
        self.duplicate_fills.fetch_add(1, Ordering::Relaxed);
    }

    /// Late fills and overfills.
    pub fn inc_rejected_fills(&self) {
        self.rejected_fills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnect_successes(&self) {
        self.reconnect_successes.fetch_add(1, Ordering::Relaxed);
    }

    // --- Getter methods ---

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    pub fn orphan_messages(&self) -> u64 {
        self.orphan_messages.load(Ordering::Relaxed)
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    pub fn request_timeouts(&self) -> u64 {
        self.request_timeouts.load(Ordering::Relaxed)
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.load(Ordering::Relaxed)
    }

    pub fn fills_applied(&self) -> u64 {
        self.fills_applied.load(Ordering::Relaxed)
    }

    pub fn duplicate_fills(&self) -> u64 {
        self.duplicate_fills.load(Ordering::Relaxed)
    }

    pub fn rejected_fills(&self) -> u64 {
        self.rejected_fills.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn reconnect_successes(&self) -> u64 {
        self.reconnect_successes.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_frame(&self) -> Option<f64> {
        self.inner
            .read()
            .last_frame_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_fill(&self) -> Option<f64> {
        self.inner
            .read()
            .last_fill_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received(),
            malformed_frames: self.malformed_frames(),
            orphan_messages: self.orphan_messages(),
            protocol_errors: self.protocol_errors(),
            requests_sent: self.requests_sent(),
            request_timeouts: self.request_timeouts(),
            transport_errors: self.transport_errors(),
            fills_applied: self.fills_applied(),
            duplicate_fills: self.duplicate_fills(),
            rejected_fills: self.rejected_fills(),
            reconnect_attempts: self.reconnect_attempts(),
            reconnect_successes: self.reconnect_successes(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_frame: self.secs_since_last_frame(),
            secs_since_last_fill: self.secs_since_last_fill(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub orphan_messages: u64,
    pub protocol_errors: u64,
    pub requests_sent: u64,
    pub request_timeouts: u64,
    pub transport_errors: u64,
    pub fills_applied: u64,
    pub duplicate_fills: u64,
    pub rejected_fills: u64,
    pub reconnect_attempts: u64,
    pub reconnect_successes: u64,
    pub uptime_secs: f64,
    pub secs_since_last_frame: Option<f64>,
    pub secs_since_last_fill: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health of the venue session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Frames are arriving.
    Healthy,
    /// No frame for longer than a heartbeat period.
    Degraded,
    /// No frame for two heartbeat periods.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// Matches the default heartbeat interval.
    const STALE_THRESHOLD_SECS: f64 = 30.0;
    const UNHEALTHY_THRESHOLD_SECS: f64 = 60.0;

    /// Health by staleness of the last inbound frame.
    pub fn health_status(&self) -> HealthStatus {
        let idle = self.secs_since_last_frame.unwrap_or(self.uptime_secs);

        if idle > Self::UNHEALTHY_THRESHOLD_SECS {
            HealthStatus::Unhealthy
        } else if idle > Self::STALE_THRESHOLD_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Metrics ===")?;
        writeln!(f, "Uptime:              {:.1}s", self.uptime_secs)?;
        writeln!(f, "Health:              {}", self.health_status())?;
        writeln!(f, "Frames received:     {}", self.frames_received)?;
        writeln!(f, "Malformed frames:    {}", self.malformed_frames)?;
        writeln!(f, "Orphan messages:     {}", self.orphan_messages)?;
        writeln!(f, "Protocol errors:     {}", self.protocol_errors)?;
        writeln!(f, "Requests sent:       {}", self.requests_sent)?;
        writeln!(f, "Request timeouts:    {}", self.request_timeouts)?;
        writeln!(f, "Transport errors:    {}", self.transport_errors)?;
        writeln!(f, "Fills applied:       {}", self.fills_applied)?;
        writeln!(f, "Duplicate fills:     {}", self.duplicate_fills)?;
        writeln!(f, "Rejected fills:      {}", self.rejected_fills)?;
        writeln!(f, "Reconnect attempts:  {}", self.reconnect_attempts)?;
        writeln!(f, "Reconnect successes: {}", self.reconnect_successes)?;
        if let Some(secs) = self.secs_since_last_frame {
            writeln!(f, "Since last frame:    {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_fill {
            writeln!(f, "Since last fill:     {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:    {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<SessionMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(SessionMetrics::new())
}
