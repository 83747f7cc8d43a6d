//! Shared numeric constants for the viewport crate.

// ── Drag ────────────────────────────────────────────────────────

/// Bit in the pointer `buttons` mask that turns a drag into a zoom drag.
pub const ZOOM_BUTTON_MASK: u32 = 4;

/// Vertical drag pixels per unit of zoom while the zoom button is held.
pub const ZOOM_SLUGGISHNESS: f64 = 30.0;

// ── Wheel ───────────────────────────────────────────────────────

/// Wheel delta per unit of zoom when the device reports pixels.
pub const WHEEL_ZOOM_SLUGGISHNESS_PIXELS: f64 = 200.0;

/// Wheel delta per unit of zoom when the device reports lines.
pub const WHEEL_ZOOM_SLUGGISHNESS_LINES: f64 = 10.0;

/// Wheel delta per unit of zoom when the device reports pages.
pub const WHEEL_ZOOM_SLUGGISHNESS_PAGES: f64 = 1.0;

// ── Sync loop ───────────────────────────────────────────────────

/// Idle re-check interval when the desired view is already requested.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// How long a fetch may stay outstanding before it is abandoned.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Back-off after a failed or abandoned fetch before re-requesting.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

// ── Debug channel ───────────────────────────────────────────────

/// Lines retained by an enabled debug log.
pub const DEBUG_LOG_CAPACITY: usize = 256;

// ── View ────────────────────────────────────────────────────────

/// Height of the complex plane visible at zoom level 0 and scale 1.
pub const BASE_SPAN: f64 = 3.0;
