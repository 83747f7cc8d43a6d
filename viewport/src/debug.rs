//! Optional diagnostic line log.
//!
//! A disabled log is a no-op. An enabled log keeps the most recent lines in a
//! bounded ring (the display's debug region reads from it) and mirrors each
//! line to `tracing` at DEBUG level.

#[cfg(test)]
#[path = "debug_test.rs"]
mod debug_test;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::lock;

#[derive(Debug, Clone, Default)]
pub struct DebugLog {
    ring: Option<Arc<Mutex<Ring>>>,
}

#[derive(Debug)]
struct Ring {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DebugLog {
    /// A log that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { ring: None }
    }

    /// A log that keeps the last `capacity` lines.
    #[must_use]
    pub fn enabled(capacity: usize) -> Self {
        let ring = Ring { lines: VecDeque::with_capacity(capacity), capacity: capacity.max(1) };
        Self { ring: Some(Arc::new(Mutex::new(ring))) }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.ring.is_some()
    }

    /// Record a line. The closure only runs when the log is enabled.
    pub fn emit(&self, line: impl FnOnce() -> String) {
        let Some(ring) = &self.ring else {
            return;
        };
        let line = line();
        tracing::debug!(target: "viewport::debug", "{line}");
        let mut ring = lock(ring);
        if ring.lines.len() == ring.capacity {
            ring.lines.pop_front();
        }
        ring.lines.push_back(line);
    }

    /// Retained lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.ring
            .as_ref()
            .map(|ring| lock(ring).lines.iter().cloned().collect())
            .unwrap_or_default()
    }
}
