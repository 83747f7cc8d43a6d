//! Reconciliation state machine for the view synchronizer.
//!
//! DESIGN
//! ======
//! `SyncCore` decides what the loop does next, and nothing else: it holds no
//! timers, spawns nothing and never touches the network or the surface. Time
//! comes in as an argument, so the whole machine is testable with plain
//! `Instant` arithmetic. The async driver in [`crate::engine`] executes the
//! returned [`Step`]s.
//!
//! States are `Idle`, `Fetching` and `Destroyed`. At most one fetch is ever
//! outstanding: while `Fetching`, `reconcile` only reports what it is waiting
//! for. A completion is accepted only if it carries the sequence number of
//! the outstanding fetch; anything else is stale and discarded.
//!
//! ERROR HANDLING
//! ==============
//! A failed or timed-out fetch rolls `requested` back to `available` and
//! starts a back-off window. Once the window passes, the next reconcile
//! re-requests the desired view if it still differs from what is displayed.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::time::Duration;

use tokio::time::Instant;

use crate::consts::{DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RETRY_DELAY_MS};
use crate::image::{FetchError, RenderedImage};
use crate::view::{Tolerance, ViewState};

/// Timing and comparison knobs for the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Re-check interval while the desired view is already requested.
    pub poll_interval: Duration,
    /// Abandon a fetch after this long. `None` waits forever.
    pub fetch_timeout: Option<Duration>,
    /// Back-off after a failed or abandoned fetch.
    pub retry_delay: Duration,
    /// How close desired and requested must be to count as the same view.
    pub tolerance: Tolerance,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            fetch_timeout: Some(Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS)),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            tolerance: Tolerance::EXACT,
        }
    }
}

/// Lifecycle of one viewer's synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching { sequence: u64, issued_at: Instant },
    Destroyed,
}

/// A fetch the driver must start.
#[derive(Debug, Clone)]
pub struct ImageRequest<V> {
    pub sequence: u64,
    pub view: V,
    pub issued_at: Instant,
}

/// A finished fetch, tagged with the request it answers.
#[derive(Debug)]
pub struct Completion<V> {
    pub sequence: u64,
    pub view: V,
    pub issued_at: Instant,
    pub outcome: Result<RenderedImage, FetchError>,
}

impl<V> Completion<V> {
    #[must_use]
    pub fn new(request: ImageRequest<V>, outcome: Result<RenderedImage, FetchError>) -> Self {
        let ImageRequest { sequence, view, issued_at } = request;
        Self { sequence, view, issued_at, outcome }
    }
}

/// What the driver should do next.
#[derive(Debug)]
pub enum Step<V> {
    /// Start this fetch, then reconcile again.
    Fetch(ImageRequest<V>),
    /// A fetch is outstanding. Wait for its completion, or until `deadline`.
    Pending { sequence: u64, deadline: Option<Instant> },
    /// Nothing to do; reconcile again after this delay.
    Wait(Duration),
    /// The viewer is destroyed; stop.
    Halt,
}

/// Why a completion was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Destroyed,
    Stale,
}

/// Outcome of feeding a completion to the core.
#[derive(Debug)]
pub enum Resolution {
    /// Show this image; `available` now holds its view.
    Display { sequence: u64, image: RenderedImage },
    /// The fetch failed; back-off has started.
    Failed { sequence: u64, error: FetchError },
    /// The completion was ignored.
    Discarded { sequence: u64, reason: DiscardReason },
}

/// The reconciliation state machine.
#[derive(Debug)]
pub struct SyncCore<V> {
    config: SyncConfig,
    state: SyncState,
    requested: Option<V>,
    available: Option<V>,
    next_sequence: u64,
    backoff_until: Option<Instant>,
}

impl<V: ViewState> SyncCore<V> {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self { config, state: SyncState::Idle, requested: None, available: None, next_sequence: 0, backoff_until: None }
    }

    // --- Queries ---

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Snapshot of the most recently requested view.
    #[must_use]
    pub fn requested(&self) -> Option<&V> {
        self.requested.as_ref()
    }

    /// Snapshot of the view currently displayed.
    #[must_use]
    pub fn available(&self) -> Option<&V> {
        self.available.as_ref()
    }

    /// Number of fetches issued so far (also the next sequence number).
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next_sequence
    }

    // --- Transitions ---

    /// Compare `desired` against the last request and decide the next step.
    pub fn reconcile(&mut self, desired: &V, now: Instant) -> Step<V> {
        match self.state {
            SyncState::Destroyed => return Step::Halt,
            SyncState::Fetching { sequence, issued_at } => {
                let deadline = self.config.fetch_timeout.map(|timeout| issued_at + timeout);
                return Step::Pending { sequence, deadline };
            }
            SyncState::Idle => {}
        }

        if let Some(until) = self.backoff_until {
            if now < until {
                return Step::Wait(until - now);
            }
            self.backoff_until = None;
        }

        let up_to_date = self
            .requested
            .as_ref()
            .is_some_and(|requested| desired.same_view(requested, self.config.tolerance));
        if up_to_date {
            return Step::Wait(self.config.poll_interval);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.requested = Some(desired.clone());
        self.state = SyncState::Fetching { sequence, issued_at: now };
        Step::Fetch(ImageRequest { sequence, view: desired.clone(), issued_at: now })
    }

    /// Apply a finished fetch.
    pub fn resolve(&mut self, completion: Completion<V>, now: Instant) -> Resolution {
        let Completion { sequence, view, outcome, .. } = completion;
        match self.state {
            SyncState::Destroyed => Resolution::Discarded { sequence, reason: DiscardReason::Destroyed },
            SyncState::Fetching { sequence: outstanding, .. } if outstanding == sequence => {
                self.state = SyncState::Idle;
                match outcome {
                    Ok(image) => {
                        self.available = Some(view);
                        Resolution::Display { sequence, image }
                    }
                    Err(error) => {
                        self.roll_back(now);
                        Resolution::Failed { sequence, error }
                    }
                }
            }
            SyncState::Idle | SyncState::Fetching { .. } => {
                Resolution::Discarded { sequence, reason: DiscardReason::Stale }
            }
        }
    }

    /// Abandon fetch `sequence` if it is still outstanding. Returns whether it was.
    pub fn expire(&mut self, sequence: u64, now: Instant) -> bool {
        match self.state {
            SyncState::Fetching { sequence: outstanding, .. } if outstanding == sequence => {
                self.state = SyncState::Idle;
                self.roll_back(now);
                true
            }
            _ => false,
        }
    }

    /// Enter the terminal state. Idempotent.
    pub fn destroy(&mut self) {
        self.state = SyncState::Destroyed;
    }

    fn roll_back(&mut self, now: Instant) {
        self.requested.clone_from(&self.available);
        self.backoff_until = Some(now + self.config.retry_delay);
    }
}
