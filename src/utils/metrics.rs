//! Client Metrics
//!
//! Per-client counters for sessions, packets and failures. Each [`Sender`]
//! owns its own collector behind an `Arc`, so two clients in one process never
//! share counts. Callers that want aggregate numbers can hand the same
//! `Arc<Metrics>` to several senders.
//!
//! [`Sender`]: crate::service::sender::Sender

use crate::error::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

/// Counters for one client instance
#[derive(Debug)]
pub struct Metrics {
    /// Transport connections established
    pub connections_total: AtomicU64,
    /// Sessions successfully opened
    pub sessions_opened: AtomicU64,
    /// Session opens that failed
    pub sessions_failed: AtomicU64,
    /// Sessions closed (close packet attempted)
    pub sessions_closed: AtomicU64,
    /// Packets written
    pub packets_sent: AtomicU64,
    /// Packets read and verified
    pub packets_received: AtomicU64,
    /// Bytes written including headers
    pub bytes_sent: AtomicU64,
    /// Bytes read including headers
    pub bytes_received: AtomicU64,
    /// Connect/send/receive failures and timeouts
    pub connection_errors: AtomicU64,
    /// HMAC or AES-GCM tag failures
    pub integrity_failures: AtomicU64,
    /// Bad framing, unexpected commands, server rejections
    pub protocol_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet written to the transport
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a packet that passed verification
    pub fn packet_received(&self, byte_count: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Bucket a failure by its taxonomy row
    pub fn record_error(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::Connection => &self.connection_errors,
            ErrorKind::Integrity | ErrorKind::Authentication => &self.integrity_failures,
            ErrorKind::MalformedHeader | ErrorKind::Protocol => &self.protocol_errors,
            ErrorKind::Validation | ErrorKind::Config => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Emit the current counters as one structured event
    pub fn log_metrics(&self) {
        let s = self.snapshot();
        debug!(
            connections_total = s.connections_total,
            sessions_opened = s.sessions_opened,
            sessions_failed = s.sessions_failed,
            sessions_closed = s.sessions_closed,
            packets_sent = s.packets_sent,
            packets_received = s.packets_received,
            bytes_sent = s.bytes_sent,
            bytes_received = s.bytes_received,
            connection_errors = s.connection_errors,
            integrity_failures = s.integrity_failures,
            protocol_errors = s.protocol_errors,
            uptime_seconds = s.uptime_seconds,
            "Client metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub sessions_opened: u64,
    pub sessions_failed: u64,
    pub sessions_closed: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_errors: u64,
    pub integrity_failures: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

/// Logs the elapsed time of an operation when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Operation completed"
        );
    }
}
