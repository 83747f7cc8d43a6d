use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;

use super::*;
use crate::image::{FetchError, RenderedImage};
use crate::view::MandelbrotView;

// =============================================================================
// FAKES
// =============================================================================

type Outcome = Result<RenderedImage, FetchError>;

/// Image source whose fetches block until the test resolves them, in order.
#[derive(Clone, Default)]
struct GatedSource {
    inner: Arc<GateInner>,
}

#[derive(Default)]
struct GateInner {
    calls: Mutex<Vec<MandelbrotView>>,
    gates: Mutex<VecDeque<oneshot::Sender<Outcome>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlightGuard(Arc<GateInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GatedSource {
    fn calls(&self) -> Vec<MandelbrotView> {
        self.inner.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Resolve the oldest fetch that is still waiting.
    fn resolve_next(&self, mut outcome: Outcome) {
        let mut gates = self.inner.gates.lock().unwrap();
        while let Some(gate) = gates.pop_front() {
            match gate.send(outcome) {
                Ok(()) => return,
                Err(back) => outcome = back,
            }
        }
        panic!("no fetch waiting");
    }
}

#[async_trait::async_trait]
impl ImageSource<MandelbrotView> for GatedSource {
    async fn fetch(&self, view: &MandelbrotView) -> Outcome {
        self.inner.calls.lock().unwrap().push(view.clone());
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.inner));

        let (tx, rx) = oneshot::channel();
        self.inner.gates.lock().unwrap().push_back(tx);
        rx.await.unwrap_or_else(|_| Err(FetchError::Request("gate dropped".into())))
    }
}

#[derive(Default)]
struct SurfaceLog {
    mounted: Option<(u32, u32)>,
    images: Vec<RenderedImage>,
}

#[derive(Clone, Default)]
struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    fn mounted(&self) -> Option<(u32, u32)> {
        self.log.lock().unwrap().mounted
    }

    fn images(&self) -> Vec<RenderedImage> {
        self.log.lock().unwrap().images.clone()
    }
}

impl Surface for RecordingSurface {
    fn mount(&mut self, width: u32, height: u32) {
        let mut log = self.log.lock().unwrap();
        log.mounted = Some((width, height));
        log.images.clear();
    }

    fn replace_image(&mut self, image: RenderedImage) {
        self.log.lock().unwrap().images.push(image);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn initial_view() -> MandelbrotView {
    MandelbrotView::new(0.0, 0.0, 1.0, 320, 240)
}

fn image(tag: &str) -> RenderedImage {
    RenderedImage::new(tag.as_bytes().to_vec(), "image/png")
}

fn options() -> ViewerOptions {
    let sync = SyncConfig { fetch_timeout: None, ..SyncConfig::default() };
    ViewerOptions { sync, debug: DebugLog::disabled() }
}

fn pan(dx: f64, dy: f64) -> GestureEvent {
    GestureEvent::DragMove { dx, dy, buttons: 0 }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn start(source: &GatedSource, surface: &RecordingSurface, options: ViewerOptions) -> Viewer<MandelbrotView> {
    Viewer::new(surface.clone(), source.clone(), initial_view(), options)
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

#[tokio::test(start_paused = true)]
async fn construction_mounts_surface_before_any_fetch() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());

    assert_eq!(surface.mounted(), Some((320, 240)));
    assert_eq!(source.call_count(), 0);
    assert_eq!(viewer.desired(), initial_view());
}

#[tokio::test(start_paused = true)]
async fn construction_issues_fetch_zero_for_initial_view() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());

    wait_until(|| source.call_count() == 1).await;
    assert_eq!(source.calls()[0], initial_view());
    let status = viewer.status();
    assert!(matches!(status.state, SyncState::Fetching { sequence: 0, .. }));
    assert_eq!(status.requested, Some(initial_view()));
    assert_eq!(status.available, None);
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn two_pans_during_fetch_zero_yield_one_combined_fetch() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());
    wait_until(|| source.call_count() == 1).await;

    viewer.handle_event(pan(12.0, -4.0));
    viewer.handle_event(pan(3.0, 9.0));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(source.call_count(), 1);

    source.resolve_next(Ok(image("zero")));
    wait_until(|| source.call_count() == 2).await;

    let mut expected = initial_view();
    expected.pan_by(12.0, -4.0);
    expected.pan_by(3.0, 9.0);
    assert_eq!(source.calls()[1], expected);
    assert_eq!(surface.images(), vec![image("zero")]);
    assert_eq!(viewer.status().available, Some(initial_view()));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(surface.images(), vec![image("zero")]);
    assert_eq!(source.call_count(), 2);

    source.resolve_next(Ok(image("one")));
    wait_until(|| surface.images().len() == 2).await;
    assert_eq!(surface.images()[1], image("one"));
    assert_eq!(viewer.status().available, Some(expected));
}

#[tokio::test(start_paused = true)]
async fn gesture_reacting_to_a_swap_is_fetched_without_idle_wait() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let sync = SyncConfig { fetch_timeout: None, poll_interval: Duration::from_secs(10), ..SyncConfig::default() };
    let viewer = Arc::new(start(&source, &surface, ViewerOptions { sync, debug: DebugLog::disabled() }));
    wait_until(|| source.call_count() == 1).await;

    let mut status = viewer.watch_status();
    let panner = Arc::clone(&viewer);
    let watcher = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            if status.borrow_and_update().available.is_some() {
                panner.handle_event(pan(5.0, 0.0));
                break;
            }
        }
    });

    source.resolve_next(Ok(image("zero")));
    watcher.await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut expected = initial_view();
    expected.pan_by(5.0, 0.0);
    assert_eq!(source.call_count(), 2);
    assert_eq!(source.calls()[1], expected);
}

#[tokio::test(start_paused = true)]
async fn burst_of_changes_coalesces_to_latest_view() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());
    wait_until(|| source.call_count() == 1).await;

    for i in 0..20 {
        viewer.handle_event(pan(f64::from(i), 1.0));
        viewer.handle_event(GestureEvent::Wheel { delta_y: Some(20.0), delta_mode: Some(0) });
        tokio::time::sleep(Duration::from_millis(7)).await;
    }
    let latest = viewer.desired();

    source.resolve_next(Ok(image("zero")));
    wait_until(|| source.call_count() == 2).await;
    assert_eq!(source.calls()[1], latest);

    source.resolve_next(Ok(image("one")));
    wait_until(|| surface.images().len() == 2).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn idle_viewer_only_polls_after_first_fetch() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());
    wait_until(|| source.call_count() == 1).await;
    source.resolve_next(Ok(image("zero")));
    wait_until(|| surface.images().len() == 1).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(source.call_count(), 1);
    assert_eq!(viewer.status().issued, 1);
    assert_eq!(viewer.status().state, SyncState::Idle);

    viewer.handle_event(GestureEvent::GestureMove { ds: 0.25 });
    wait_until(|| source.call_count() == 2).await;
    assert_eq!(source.calls()[1].scale, 1.25);
}

#[tokio::test(start_paused = true)]
async fn never_more_than_one_fetch_in_flight() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());

    for round in 0..6 {
        wait_until(|| source.call_count() == round + 1).await;
        for _ in 0..5 {
            viewer.handle_event(pan(2.0, 2.0));
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        source.resolve_next(Ok(image("frame")));
    }
    assert_eq!(source.max_in_flight(), 1);
}

// =============================================================================
// TEARDOWN
// =============================================================================

#[tokio::test(start_paused = true)]
async fn destroy_discards_in_flight_result() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());
    wait_until(|| source.call_count() == 1).await;

    viewer.destroy();
    assert!(viewer.is_destroyed());
    source.resolve_next(Ok(image("late")));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(surface.images().is_empty());
    assert_eq!(viewer.status().state, SyncState::Destroyed);
    assert_eq!(viewer.status().available, None);
}

#[tokio::test(start_paused = true)]
async fn no_fetches_or_swaps_after_destroy() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());
    wait_until(|| source.call_count() == 1).await;
    source.resolve_next(Ok(image("zero")));
    wait_until(|| surface.images().len() == 1).await;

    viewer.destroy();
    viewer.handle_event(pan(40.0, 0.0));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(source.call_count(), 1);
    assert_eq!(surface.images(), vec![image("zero")]);
}

#[tokio::test(start_paused = true)]
async fn dropping_viewer_tears_it_down() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());
    wait_until(|| source.call_count() == 1).await;

    drop(viewer);
    source.resolve_next(Ok(image("late")));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(surface.images().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_loop_to_stop() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());
    wait_until(|| source.call_count() == 1).await;

    let status = viewer.watch_status();
    viewer.shutdown().await;
    assert_eq!(status.borrow().state, SyncState::Destroyed);
}

// =============================================================================
// FAILURE HANDLING
// =============================================================================

#[tokio::test(start_paused = true)]
async fn stuck_fetch_times_out_and_is_retried() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let sync = SyncConfig {
        fetch_timeout: Some(Duration::from_secs(1)),
        retry_delay: Duration::from_millis(100),
        ..SyncConfig::default()
    };
    let viewer = start(&source, &surface, ViewerOptions { sync, debug: DebugLog::disabled() });

    wait_until(|| source.call_count() == 1).await;
    wait_until(|| source.call_count() == 2).await;
    assert_eq!(source.calls()[1], initial_view());
    assert_eq!(source.max_in_flight(), 1);

    source.resolve_next(Ok(image("retry")));
    wait_until(|| surface.images().len() == 1).await;
    assert_eq!(viewer.status().available, Some(initial_view()));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_backs_off_before_retrying() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let sync = SyncConfig { fetch_timeout: None, retry_delay: Duration::from_secs(3), ..SyncConfig::default() };
    let _viewer = start(&source, &surface, ViewerOptions { sync, debug: DebugLog::disabled() });

    wait_until(|| source.call_count() == 1).await;
    source.resolve_next(Err(FetchError::Status { status: 500 }));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.call_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.call_count(), 2);
    assert!(surface.images().is_empty());
}

/// First fetch blocks its worker thread until released, so an abort cannot
/// stop it from delivering a late result. Every later fetch never resolves.
#[derive(Clone)]
struct LateFirstSource {
    release: Arc<Mutex<Option<std::sync::mpsc::Receiver<()>>>>,
    calls: Arc<AtomicUsize>,
    stuck: Arc<GateInner>,
}

#[async_trait::async_trait]
impl ImageSource<MandelbrotView> for LateFirstSource {
    async fn fetch(&self, _view: &MandelbrotView) -> Outcome {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let release = self.release.lock().unwrap().take().unwrap();
            tokio::task::block_in_place(|| release.recv().unwrap());
            return Ok(image("late"));
        }
        let now = self.stuck.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stuck.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.stuck));
        std::future::pending().await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_result_of_expired_fetch_keeps_successor_abortable() {
    let (release_tx, release_rx) = std::sync::mpsc::channel();
    let source = LateFirstSource {
        release: Arc::new(Mutex::new(Some(release_rx))),
        calls: Arc::default(),
        stuck: Arc::default(),
    };
    let surface = RecordingSurface::default();
    let sync = SyncConfig {
        fetch_timeout: Some(Duration::from_millis(50)),
        retry_delay: Duration::from_millis(10),
        ..SyncConfig::default()
    };
    let viewer = Viewer::new(surface.clone(), source.clone(), initial_view(), ViewerOptions {
        sync,
        debug: DebugLog::disabled(),
    });

    // #0 has expired and a successor is outstanding when #0's result lands.
    wait_until(|| source.calls.load(Ordering::SeqCst) >= 2).await;
    release_tx.send(()).unwrap();

    // Several more timeouts: each must abort its fetch before the next starts.
    wait_until(|| source.calls.load(Ordering::SeqCst) >= 6).await;
    assert_eq!(source.stuck.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(source.stuck.in_flight.load(Ordering::SeqCst) <= 1);
    assert!(surface.images().is_empty());
    viewer.shutdown().await;
}

// =============================================================================
// GESTURES AND DEBUG
// =============================================================================

#[tokio::test(start_paused = true)]
async fn drag_latch_clears_only_after_yielding() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());

    viewer.handle_event(GestureEvent::DragStart);
    assert!(viewer.is_dragging());
    let response = viewer.handle_event(GestureEvent::DragEnd);
    assert!(response.release.is_some());
    assert!(viewer.is_dragging());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!viewer.is_dragging());
}

#[tokio::test(start_paused = true)]
async fn events_mutate_desired_view() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let viewer = start(&source, &surface, options());

    let response = viewer.handle_event(GestureEvent::DragMove { dx: 0.0, dy: 30.0, buttons: 4 });
    assert!(response.prevent_default);
    assert!((viewer.desired().zoom_level - 2.0).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn enabled_debug_log_records_fetches_and_swaps() {
    let source = GatedSource::default();
    let surface = RecordingSurface::default();
    let debug = DebugLog::enabled(64);
    let sync = SyncConfig { fetch_timeout: None, ..SyncConfig::default() };
    let viewer = start(&source, &surface, ViewerOptions { sync, debug: debug.clone() });

    wait_until(|| source.call_count() == 1).await;
    source.resolve_next(Ok(image("zero")));
    wait_until(|| surface.images().len() == 1).await;
    viewer.destroy();

    let lines = debug.lines();
    assert!(lines.iter().any(|l| l.starts_with("fetch #0")));
    assert!(lines.iter().any(|l| l == "displayed #0"));
    assert!(lines.iter().any(|l| l == "viewer destroyed"));
}
