//! Viewport controller for a remotely rendered Mandelbrot view.
//!
//! The crate owns the interactive half of the viewer: translating normalized
//! gesture events into changes of the desired view, and keeping the displayed
//! image eventually consistent with that view by fetching renders from a
//! remote service one at a time. The host binary supplies the concrete
//! [`image::ImageSource`] (HTTP) and [`image::Surface`] (where images land).
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | [`engine::Viewer`]: construction, teardown and the async sync loop |
//! | [`sync`] | Pure reconciliation state machine ([`sync::SyncCore`]) |
//! | [`input`] | Gesture event types and the [`input::GestureTranslator`] |
//! | [`view`] | View-state capability trait and the Mandelbrot view |
//! | [`image`] | Rendered images and the fetch/display seams |
//! | [`debug`] | Optional diagnostic line log |
//! | [`consts`] | Sensitivity constants and timing defaults |

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod consts;
pub mod debug;
pub mod engine;
pub mod image;
pub mod input;
pub mod sync;
pub mod view;

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate is a short synchronous update, so a
/// poisoned value is still fully formed.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
