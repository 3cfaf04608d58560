//! Byte-level progress of one upload or download
//!
//! A `TransferState` is written by the transport's worker threads and read
//! concurrently by whoever renders progress. All counters are atomics, so a
//! shared `&TransferState` (or `Arc<TransferState>`) is enough.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

const UNKNOWN_TOTAL: u64 = u64::MAX;

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Lifecycle of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferStatus {
    NotStarted = 0,
    InProgress = 1,
    Completed = 2,
    Failed = 3,
}

impl TransferStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::InProgress,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::NotStarted,
        }
    }

    /// Whether the transfer has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time copy of a `TransferState`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSnapshot {
    pub status: TransferStatus,
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
    pub elapsed: Duration,
}

impl TransferSnapshot {
    /// Fraction complete in `0.0..=1.0`, if the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_transferred as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Thread-safe transfer progress counters
#[derive(Debug)]
pub struct TransferState {
    status: AtomicU8,
    bytes_transferred: AtomicU64,
    total_bytes: AtomicU64,
    started_at: OnceLock<Instant>,
}

impl TransferState {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(TransferStatus::NotStarted as u8),
            bytes_transferred: AtomicU64::new(0),
            total_bytes: AtomicU64::new(UNKNOWN_TOTAL),
            started_at: OnceLock::new(),
        }
    }

    /// Move `NotStarted -> InProgress` and record the start time
    pub fn start(&self) {
        let _ = self.started_at.set(Instant::now());
        self.transition(TransferStatus::NotStarted, TransferStatus::InProgress);
    }

    /// Record the total once listing has completed
    pub fn set_total(&self, total: u64) {
        // u64::MAX is the "unknown" sentinel
        self.total_bytes
            .store(total.min(UNKNOWN_TOTAL - 1), Ordering::Release);
    }

    /// Add freshly transferred bytes. Counters only ever grow.
    pub fn add_bytes(&self, bytes: u64) {
        if bytes > 0 {
            self.bytes_transferred.fetch_add(bytes, Ordering::AcqRel);
        }
    }

    /// Mark the transfer as completed
    pub fn complete(&self) {
        self.transition(TransferStatus::InProgress, TransferStatus::Completed);
    }

    /// Mark the transfer as failed (from any non-terminal state)
    pub fn fail(&self) {
        if !self.transition(TransferStatus::InProgress, TransferStatus::Failed) {
            self.transition(TransferStatus::NotStarted, TransferStatus::Failed);
        }
    }

    fn transition(&self, from: TransferStatus, to: TransferStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn status(&self) -> TransferStatus {
        TransferStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Acquire)
    }

    /// Total size, `None` until known
    pub fn total_bytes(&self) -> Option<u64> {
        match self.total_bytes.load(Ordering::Acquire) {
            UNKNOWN_TOTAL => None,
            total => Some(total),
        }
    }

    /// Time since `start()`, zero if not started
    pub fn elapsed(&self) -> Duration {
        self.started_at
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    pub fn fraction(&self) -> Option<f64> {
        self.snapshot().fraction()
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            status: self.status(),
            bytes_transferred: self.bytes_transferred(),
            total_bytes: self.total_bytes(),
            elapsed: self.elapsed(),
        }
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}
