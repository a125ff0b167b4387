//! Runtime counters for troubleshooting a dashboard session.
//!
//! Counters are plain atomics so the background MQTT task can record decode
//! failures without coordinating with the refresh cycle.
//!
//! ```
//! use garden_core::Diagnostics;
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.record_fetch_success();
//! diagnostics.record_decode_failure("expected value at line 1 column 1");
//!
//! let report = diagnostics.snapshot();
//! assert_eq!(report.fetch_successes, 1);
//! assert_eq!(report.decode_failures, 1);
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;

/// Session-wide counters.
#[derive(Debug, Default)]
pub struct Diagnostics {
    decode_failures: AtomicU64,
    fetch_successes: AtomicU64,
    fetch_failures: AtomicU64,
    updates_applied: AtomicU64,
    commands_sent: AtomicU64,
    commands_failed: AtomicU64,
    commands_rejected: AtomicU64,
    last_decode_error: Mutex<Option<DecodeFailure>>,
}

/// The most recent payload that could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeFailure {
    /// Decoder message.
    pub message: String,
    /// When it happened.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// Point-in-time copy of [`Diagnostics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub decode_failures: u64,
    pub fetch_successes: u64,
    pub fetch_failures: u64,
    pub updates_applied: u64,
    pub commands_sent: u64,
    pub commands_failed: u64,
    pub commands_rejected: u64,
    pub last_decode_error: Option<DecodeFailure>,
}

impl Diagnostics {
    /// Create a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload that was dropped because it could not be decoded.
    pub fn record_decode_failure(&self, message: impl Into<String>) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        let failure = DecodeFailure {
            message: message.into(),
            at: OffsetDateTime::now_utc(),
        };
        if let Ok(mut last) = self.last_decode_error.lock() {
            *last = Some(failure);
        }
    }

    pub fn record_fetch_success(&self) {
        self.fetch_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_failed(&self) {
        self.commands_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a command refused before reaching the transport.
    pub fn record_command_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of dropped payloads.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> DiagnosticsReport {
        DiagnosticsReport {
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            last_decode_error: self
                .last_decode_error
                .lock()
                .ok()
                .and_then(|last| last.clone()),
        }
    }
}
