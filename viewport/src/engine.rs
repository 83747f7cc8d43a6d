//! The viewer: construction, gesture entry point, teardown and the async loop
//! that drives [`SyncCore`].
//!
//! DESIGN
//! ======
//! One tokio task per viewer runs the loop. It snapshots the shared desired
//! view, asks the core for the next step and executes it: fetches run as
//! their own tasks and report back over a channel as tagged [`Completion`]s;
//! idle re-checks sleep for the poll interval. Teardown wakes the loop
//! through a `watch` channel.
//!
//! The surface lives behind a mutex together with the `destroyed` flag. An
//! image swap checks the flag under that lock, and [`Viewer::destroy`] sets
//! it under the same lock, so once `destroy` returns the surface is never
//! touched again.
//!
//! A fetch still in flight at teardown is not aborted. It completes, finds
//! the completion channel closed and drops its result. A fetch that outlives
//! its timeout is aborted so that at most one request is ever outstanding.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::debug::DebugLog;
use crate::image::{ImageSource, Surface};
use crate::input::{EventResponse, GestureEvent, GestureTranslator};
use crate::lock;
use crate::sync::{Completion, ImageRequest, Resolution, Step, SyncConfig, SyncCore, SyncState};
use crate::view::{SharedView, ViewState};

/// Configuration for one viewer instance.
#[derive(Debug, Clone, Default)]
pub struct ViewerOptions {
    pub sync: SyncConfig,
    pub debug: DebugLog,
}

/// Observable synchronizer state, published after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus<V> {
    pub state: SyncState,
    pub requested: Option<V>,
    pub available: Option<V>,
    /// Fetches issued so far.
    pub issued: u64,
}

impl<V: ViewState> SyncStatus<V> {
    fn of(core: &SyncCore<V>) -> Self {
        Self {
            state: core.state(),
            requested: core.requested().cloned(),
            available: core.available().cloned(),
            issued: core.issued(),
        }
    }
}

struct Display {
    surface: Box<dyn Surface>,
    destroyed: bool,
}

type SharedDisplay = Arc<Mutex<Display>>;

// =============================================================================
// VIEWER
// =============================================================================

/// An interactive viewer bound to one surface.
///
/// Must be created inside a tokio runtime. Dropping the viewer destroys it.
pub struct Viewer<V: ViewState> {
    desired: SharedView<V>,
    translator: GestureTranslator,
    display: SharedDisplay,
    lifecycle: watch::Sender<bool>,
    status: watch::Receiver<SyncStatus<V>>,
    debug: DebugLog,
    task: Option<JoinHandle<()>>,
}

impl<V: ViewState> Viewer<V> {
    /// Mount `surface`, sized to `view`, and start keeping it in sync.
    pub fn new<S, I>(mut surface: S, source: I, view: V, options: ViewerOptions) -> Self
    where
        S: Surface,
        I: ImageSource<V>,
    {
        let (width, height) = view.dimensions();
        surface.mount(width, height);

        let ViewerOptions { sync, debug } = options;
        let core = SyncCore::new(sync);
        let desired = SharedView::new(view);
        let display = Arc::new(Mutex::new(Display { surface: Box::new(surface), destroyed: false }));
        let (lifecycle, lifecycle_rx) = watch::channel(false);
        let (status_tx, status) = watch::channel(SyncStatus::of(&core));
        let (done_tx, done_rx) = mpsc::channel(4);

        let sync_loop = SyncLoop {
            core,
            desired: desired.clone(),
            source: Arc::new(source),
            display: Arc::clone(&display),
            lifecycle: lifecycle_rx,
            status: status_tx,
            done_tx,
            done_rx,
            in_flight: None,
            debug: debug.clone(),
        };
        let task = tokio::spawn(sync_loop.run());
        info!(width, height, "viewer mounted");

        Self { desired, translator: GestureTranslator::new(debug.clone()), display, lifecycle, status, debug, task: Some(task) }
    }

    /// Feed one normalized gesture event into the desired view.
    pub fn handle_event(&self, event: GestureEvent) -> EventResponse {
        let response = self.desired.update(|view| self.translator.handle(event, view));
        if let Some(token) = response.release {
            tokio::spawn(self.translator.latch().clone().release_after_yield(token));
        }
        response
    }

    /// Stop the loop. After this returns the surface is never mutated again.
    pub fn destroy(&self) {
        let first = {
            let mut display = lock(&self.display);
            !std::mem::replace(&mut display.destroyed, true)
        };
        if first {
            self.debug.emit(|| "viewer destroyed".into());
            info!("viewer destroyed");
        }
        self.lifecycle.send_replace(true);
    }

    /// Destroy the viewer and wait for its loop to finish.
    pub async fn shutdown(mut self) {
        self.destroy();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "sync loop ended abnormally");
            }
        }
    }

    // --- Queries ---

    /// Snapshot of the desired view.
    #[must_use]
    pub fn desired(&self) -> V {
        self.desired.snapshot()
    }

    /// Latest published synchronizer state.
    #[must_use]
    pub fn status(&self) -> SyncStatus<V> {
        self.status.borrow().clone()
    }

    /// A receiver that observes every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus<V>> {
        self.status.clone()
    }

    /// Whether a drag is in progress (click handlers should stand down).
    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.translator.latch().is_dragging()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        lock(&self.display).destroyed
    }

    #[must_use]
    pub fn debug_log(&self) -> &DebugLog {
        &self.debug
    }
}

impl<V: ViewState> Drop for Viewer<V> {
    fn drop(&mut self) {
        self.destroy();
    }
}

// =============================================================================
// SYNC LOOP
// =============================================================================

/// What applying a completion did to the loop.
enum Applied {
    Displayed,
    Settled,
    Halted,
}

struct SyncLoop<V: ViewState> {
    core: SyncCore<V>,
    desired: SharedView<V>,
    source: Arc<dyn ImageSource<V>>,
    display: SharedDisplay,
    lifecycle: watch::Receiver<bool>,
    status: watch::Sender<SyncStatus<V>>,
    done_tx: mpsc::Sender<Completion<V>>,
    done_rx: mpsc::Receiver<Completion<V>>,
    in_flight: Option<JoinHandle<()>>,
    debug: DebugLog,
}

impl<V: ViewState> SyncLoop<V> {
    async fn run(mut self) {
        loop {
            if *self.lifecycle.borrow() {
                self.halt();
                break;
            }

            let desired = self.desired.snapshot();
            match self.core.reconcile(&desired, Instant::now()) {
                Step::Fetch(request) => {
                    self.publish();
                    self.spawn_fetch(request);
                }
                Step::Pending { sequence, deadline } => {
                    let expiry = async {
                        match deadline {
                            Some(deadline) => tokio::time::sleep_until(deadline).await,
                            None => std::future::pending().await,
                        }
                    };
                    tokio::select! {
                        biased;
                        _ = self.lifecycle.changed() => {
                            self.halt();
                            break;
                        }
                        completion = self.done_rx.recv() => {
                            let Some(completion) = completion else {
                                self.halt();
                                break;
                            };
                            match self.complete(completion) {
                                Applied::Halted => break,
                                // Let gesture handlers run before the next reconcile.
                                Applied::Displayed => tokio::task::yield_now().await,
                                Applied::Settled => {}
                            }
                        }
                        () = expiry => self.expire(sequence),
                    }
                }
                Step::Wait(delay) => {
                    tokio::select! {
                        biased;
                        _ = self.lifecycle.changed() => {
                            self.halt();
                            break;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Step::Halt => break,
            }
        }
        debug!(issued = self.core.issued(), "sync loop stopped");
    }

    fn spawn_fetch(&mut self, request: ImageRequest<V>) {
        let sequence = request.sequence;
        self.debug.emit(|| format!("fetch #{sequence}: {:?}", request.view));
        info!(sequence, "requesting image");

        let source = Arc::clone(&self.source);
        let done = self.done_tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = source.fetch(&request.view).await;
            let elapsed_ms = u64::try_from(request.issued_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &outcome {
                Ok(image) => info!(sequence, elapsed_ms, bytes = image.bytes.len(), "image loaded"),
                Err(e) => warn!(sequence, elapsed_ms, error = %e, "image fetch failed"),
            }
            if done.send(Completion::new(request, outcome)).await.is_err() {
                debug!(sequence, "viewer gone; discarding image");
            }
        }));
    }

    /// Apply a completion.
    ///
    /// `in_flight` is only cleared for the outstanding fetch; a late result of
    /// an expired fetch must not forget the handle of its successor.
    fn complete(&mut self, completion: Completion<V>) -> Applied {
        let sequence = completion.sequence;

        let mut display = lock(&self.display);
        if display.destroyed {
            drop(display);
            debug!(sequence, "completion after teardown discarded");
            self.halt();
            return Applied::Halted;
        }

        let applied = match self.core.resolve(completion, Instant::now()) {
            Resolution::Display { sequence, image } => {
                display.surface.replace_image(image);
                drop(display);
                self.in_flight = None;
                self.debug.emit(|| format!("displayed #{sequence}"));
                Applied::Displayed
            }
            Resolution::Failed { sequence, error } => {
                drop(display);
                self.in_flight = None;
                self.debug.emit(|| format!("fetch #{sequence} failed: {error}"));
                Applied::Settled
            }
            Resolution::Discarded { sequence, reason } => {
                drop(display);
                debug!(sequence, ?reason, "completion discarded");
                Applied::Settled
            }
        };
        self.publish();
        applied
    }

    fn expire(&mut self, sequence: u64) {
        if self.core.expire(sequence, Instant::now()) {
            if let Some(task) = self.in_flight.take() {
                task.abort();
            }
            warn!(sequence, "image fetch timed out; abandoning");
            self.debug.emit(|| format!("fetch #{sequence} timed out"));
            self.publish();
        }
    }

    fn halt(&mut self) {
        self.core.destroy();
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(SyncStatus::of(&self.core));
    }
}
