//! View state: the capability contract the sync loop relies on, the
//! Mandelbrot view that implements it, and the shared desired-view cell.
//!
//! The loop never looks inside a view. It only needs to mutate one in
//! response to gestures, snapshot it, compare two snapshots and serialize a
//! snapshot into a request payload. Everything geometric stays behind
//! [`ViewState`].

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::consts::BASE_SPAN;
use crate::lock;

/// Errors produced while turning a view into a request payload.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// A view field is NaN or infinite and cannot be sent to the renderer.
    #[error("view field `{field}` is not finite")]
    NonFinite { field: &'static str },

    /// JSON encoding of the parameter array failed.
    #[error("view serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-field tolerance for deciding whether two views render the same image.
///
/// `pixels` bounds the center offset measured in screen pixels of the view
/// being compared; `zoom` and `scale` are absolute bounds. All zero means
/// exact comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tolerance {
    pub pixels: f64,
    pub zoom: f64,
    pub scale: f64,
}

impl Tolerance {
    /// Bit-for-bit comparison of every field.
    pub const EXACT: Self = Self { pixels: 0.0, zoom: 0.0, scale: 0.0 };

    #[must_use]
    pub fn new(pixels: f64, zoom: f64, scale: f64) -> Self {
        Self { pixels, zoom, scale }
    }
}

/// Capability contract for a view that can be panned, zoomed and rendered
/// remotely.
pub trait ViewState: Clone + fmt::Debug + Send + Sync + 'static {
    /// Move the view so content follows a drag of `dx`, `dy` screen pixels.
    fn pan_by(&mut self, dx: f64, dy: f64);

    /// Change the zoom level by `amount` (positive zooms in).
    fn zoom_by(&mut self, amount: f64);

    /// Multiply the magnification by `factor`.
    fn scale_by(&mut self, factor: f64);

    /// Whether `other` would render the same image within `tolerance`.
    fn same_view(&self, other: &Self, tolerance: Tolerance) -> bool;

    /// Encode the view as the renderer's URL parameter value.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError`] if the view cannot be encoded.
    fn to_url_param(&self) -> Result<String, ViewError>;

    /// Pixel dimensions `(width, height)` of the rendered image.
    fn dimensions(&self) -> (u32, u32);
}

// =============================================================================
// MANDELBROT VIEW
// =============================================================================

/// A rectangular window onto the complex plane.
///
/// `center_x` / `center_y` are plane coordinates (`y` grows upward).
/// Magnification is `2^zoom_level * scale`; at magnification 1 the shorter
/// image side spans [`BASE_SPAN`] plane units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MandelbrotView {
    pub center_x: f64,
    pub center_y: f64,
    pub zoom_level: f64,
    pub scale: f64,
    pub width: u32,
    pub height: u32,
}

impl MandelbrotView {
    #[must_use]
    pub fn new(center_x: f64, center_y: f64, zoom_level: f64, width: u32, height: u32) -> Self {
        Self { center_x, center_y, zoom_level, scale: 1.0, width, height }
    }

    /// Combined zoom-level and scale magnification.
    #[must_use]
    pub fn magnification(&self) -> f64 {
        self.zoom_level.exp2() * self.scale
    }

    /// Plane units covered by one screen pixel.
    #[must_use]
    pub fn pixel_size(&self) -> f64 {
        let short_side = self.width.min(self.height).max(1);
        BASE_SPAN / (f64::from(short_side) * self.magnification())
    }

    fn check_finite(&self) -> Result<(), ViewError> {
        let fields = [
            ("center_x", self.center_x),
            ("center_y", self.center_y),
            ("zoom_level", self.zoom_level),
            ("scale", self.scale),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some(&(field, _)) => Err(ViewError::NonFinite { field }),
            None => Ok(()),
        }
    }
}

impl ViewState for MandelbrotView {
    fn pan_by(&mut self, dx: f64, dy: f64) {
        let ps = self.pixel_size();
        self.center_x -= dx * ps;
        self.center_y += dy * ps;
    }

    fn zoom_by(&mut self, amount: f64) {
        self.zoom_level += amount;
    }

    fn scale_by(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.scale *= factor;
        }
    }

    fn same_view(&self, other: &Self, tolerance: Tolerance) -> bool {
        if self.width != other.width || self.height != other.height {
            return false;
        }
        let center_limit = tolerance.pixels * self.pixel_size();
        (self.center_x - other.center_x).abs() <= center_limit
            && (self.center_y - other.center_y).abs() <= center_limit
            && (self.zoom_level - other.zoom_level).abs() <= tolerance.zoom
            && (self.scale - other.scale).abs() <= tolerance.scale
    }

    fn to_url_param(&self) -> Result<String, ViewError> {
        self.check_finite()?;
        let params = (self.center_x, self.center_y, self.zoom_level, self.scale, self.width, self.height);
        Ok(serde_json::to_string(&params)?)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

// =============================================================================
// SHARED DESIRED VIEW
// =============================================================================

/// The desired view, shared between the gesture translator (writer) and the
/// sync loop (reader).
///
/// Updates and snapshots are short synchronous critical sections, so a reader
/// always sees a fully applied mutation.
#[derive(Debug)]
pub struct SharedView<V> {
    inner: Arc<Mutex<V>>,
}

impl<V> Clone for SharedView<V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<V: ViewState> SharedView<V> {
    #[must_use]
    pub fn new(view: V) -> Self {
        Self { inner: Arc::new(Mutex::new(view)) }
    }

    /// A deep copy of the current value.
    #[must_use]
    pub fn snapshot(&self) -> V {
        lock(&self.inner).clone()
    }

    /// Mutate the view in place and return the closure's result.
    pub fn update<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        f(&mut lock(&self.inner))
    }
}
