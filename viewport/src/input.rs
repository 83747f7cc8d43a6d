//! Input model: normalized gesture events and the translator that turns them
//! into desired-view mutations.
//!
//! Events arrive already recognized (drag, pinch, wheel). The translator
//! applies device- and modifier-specific sensitivity and mutates the view in
//! place. It never fails: events it cannot interpret are ignored. Every
//! handled event claims the platform default action, since the viewer surface
//! owns these gestures outright.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::consts::{
    WHEEL_ZOOM_SLUGGISHNESS_LINES, WHEEL_ZOOM_SLUGGISHNESS_PAGES, WHEEL_ZOOM_SLUGGISHNESS_PIXELS, ZOOM_BUTTON_MASK,
    ZOOM_SLUGGISHNESS,
};
use crate::debug::DebugLog;
use crate::view::ViewState;

/// A normalized interaction event from the gesture layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GestureEvent {
    DragStart,
    /// Pointer moved during a drag. `buttons` is the pressed-button bit mask.
    DragMove {
        dx: f64,
        dy: f64,
        #[serde(default)]
        buttons: u32,
    },
    DragEnd,
    /// Pinch update; `ds` is the change in gesture scale since the last update.
    GestureMove { ds: f64 },
    /// Wheel turn. Either field may be missing on partial events.
    Wheel {
        #[serde(default)]
        delta_y: Option<f64>,
        #[serde(default)]
        delta_mode: Option<u32>,
    },
    /// Raw touch move, claimed only to suppress pull-to-refresh.
    TouchMove,
}

/// Granularity reported by a wheel device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelUnit {
    Pixel,
    Line,
    Page,
}

impl WheelUnit {
    /// Map a DOM-style `deltaMode`: 0 is pixels, 1 is lines, anything else pages.
    #[must_use]
    pub fn from_delta_mode(mode: u32) -> Self {
        match mode {
            0 => Self::Pixel,
            1 => Self::Line,
            _ => Self::Page,
        }
    }

    /// Wheel delta that amounts to one unit of zoom in this granularity.
    #[must_use]
    pub fn sluggishness(self) -> f64 {
        match self {
            Self::Pixel => WHEEL_ZOOM_SLUGGISHNESS_PIXELS,
            Self::Line => WHEEL_ZOOM_SLUGGISHNESS_LINES,
            Self::Page => WHEEL_ZOOM_SLUGGISHNESS_PAGES,
        }
    }
}

/// A single mutation of the desired view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewChange {
    Pan { dx: f64, dy: f64 },
    Zoom { amount: f64 },
    Scale { factor: f64 },
}

impl ViewChange {
    pub fn apply<V: ViewState>(self, view: &mut V) {
        match self {
            Self::Pan { dx, dy } => view.pan_by(dx, dy),
            Self::Zoom { amount } => view.zoom_by(amount),
            Self::Scale { factor } => view.scale_by(factor),
        }
    }
}

/// Side effects of handling one event, for the host to act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventResponse {
    /// The platform default action (scroll, navigation) must be suppressed.
    pub prevent_default: bool,
    /// The mutation applied to the desired view, if any.
    pub change: Option<ViewChange>,
    /// Set on drag end: release the drag latch after yielding once.
    pub release: Option<ReleaseToken>,
}

impl EventResponse {
    fn claimed() -> Self {
        Self { prevent_default: true, change: None, release: None }
    }
}

// =============================================================================
// DRAG LATCH
// =============================================================================

/// Identifies the drag a deferred release belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseToken(u64);

/// The "dragging" flag consulted by click handlers.
///
/// Engaged on drag start. A drag end hands out a [`ReleaseToken`]; the flag
/// only clears when that token is redeemed and no newer drag has started in
/// between.
#[derive(Debug, Clone, Default)]
pub struct DragLatch {
    inner: Arc<LatchInner>,
}

#[derive(Debug, Default)]
struct LatchInner {
    dragging: AtomicBool,
    generation: AtomicU64,
}

impl DragLatch {
    pub fn engage(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.dragging.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn begin_release(&self) -> ReleaseToken {
        ReleaseToken(self.inner.generation.load(Ordering::SeqCst))
    }

    pub fn release(&self, token: ReleaseToken) {
        if self.inner.generation.load(Ordering::SeqCst) == token.0 {
            self.inner.dragging.store(false, Ordering::SeqCst);
        }
    }

    /// Yield to the scheduler once, then redeem `token`.
    pub async fn release_after_yield(self, token: ReleaseToken) {
        tokio::task::yield_now().await;
        self.release(token);
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.inner.dragging.load(Ordering::SeqCst)
    }
}

// =============================================================================
// TRANSLATOR
// =============================================================================

/// Maps gesture events onto desired-view mutations.
#[derive(Debug, Clone, Default)]
pub struct GestureTranslator {
    latch: DragLatch,
    debug: DebugLog,
}

impl GestureTranslator {
    #[must_use]
    pub fn new(debug: DebugLog) -> Self {
        Self { latch: DragLatch::default(), debug }
    }

    #[must_use]
    pub fn latch(&self) -> &DragLatch {
        &self.latch
    }

    /// The view change an event calls for, without touching any state.
    #[must_use]
    pub fn translate(event: &GestureEvent) -> Option<ViewChange> {
        match *event {
            GestureEvent::DragMove { dy, buttons, .. } if buttons & ZOOM_BUTTON_MASK != 0 => {
                dy.is_finite().then(|| ViewChange::Zoom { amount: dy / ZOOM_SLUGGISHNESS })
            }
            GestureEvent::DragMove { dx, dy, .. } => {
                (dx.is_finite() && dy.is_finite()).then_some(ViewChange::Pan { dx, dy })
            }
            GestureEvent::GestureMove { ds } => {
                let factor = 1.0 + ds;
                (factor.is_finite() && factor > 0.0).then_some(ViewChange::Scale { factor })
            }
            GestureEvent::Wheel { delta_y: Some(delta_y), delta_mode: Some(mode) } if delta_y.is_finite() => {
                let sluggishness = WheelUnit::from_delta_mode(mode).sluggishness();
                Some(ViewChange::Zoom { amount: -delta_y / sluggishness })
            }
            GestureEvent::Wheel { .. }
            | GestureEvent::DragStart
            | GestureEvent::DragEnd
            | GestureEvent::TouchMove => None,
        }
    }

    /// Apply `event` to `view` and report the side effects.
    pub fn handle<V: ViewState>(&self, event: GestureEvent, view: &mut V) -> EventResponse {
        self.debug.emit(|| format!("{event:?}"));
        let mut response = EventResponse::claimed();

        match event {
            GestureEvent::DragStart => self.latch.engage(),
            GestureEvent::DragEnd => response.release = Some(self.latch.begin_release()),
            _ => {}
        }

        if let Some(change) = Self::translate(&event) {
            let before =
                (self.debug.is_enabled() && matches!(change, ViewChange::Scale { .. })).then(|| view.clone());
            change.apply(view);
            if let Some(before) = before {
                self.debug.emit(|| format!("  scale before: {before:?}, after: {view:?}"));
            }
            response.change = Some(change);
        }

        response
    }
}
