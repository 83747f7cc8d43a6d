//! Gesture script playback.
//!
//! A script is JSON lines: one [`GestureEvent`] object per line, or a
//! `{"type":"pause","ms":N}` directive that sleeps before the next line.
//! Blank lines and lines starting with `#` are skipped. A malformed line is
//! logged and skipped, the same way a malformed gesture is ignored.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};
use viewport::engine::Viewer;
use viewport::input::GestureEvent;
use viewport::view::ViewState;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: {source}")]
    Parse { line: usize, source: serde_json::Error },
    #[error("script read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One meaningful script line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptLine {
    Event(GestureEvent),
    Pause(Duration),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Directive {
    Pause { ms: u64 },
}

/// Counters reported after playback.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStats {
    pub events: usize,
    pub pauses: usize,
    pub skipped: usize,
}

/// Parse one line; `Ok(None)` for blank and comment lines.
///
/// # Errors
///
/// Returns [`ScriptError::Parse`] when the line is neither a gesture event
/// nor a directive. The reported error is the gesture parse error.
pub fn parse_line(line_no: usize, raw: &str) -> Result<Option<ScriptLine>, ScriptError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    match serde_json::from_str::<GestureEvent>(trimmed) {
        Ok(event) => Ok(Some(ScriptLine::Event(event))),
        Err(event_err) => match serde_json::from_str::<Directive>(trimmed) {
            Ok(Directive::Pause { ms }) => Ok(Some(ScriptLine::Pause(Duration::from_millis(ms)))),
            Err(_) => Err(ScriptError::Parse { line: line_no, source: event_err }),
        },
    }
}

/// Feed every line of `reader` into `viewer`, honoring pauses.
///
/// # Errors
///
/// Returns [`ScriptError::Io`] if reading fails. Parse failures are skipped.
pub async fn play<V, R>(viewer: &Viewer<V>, reader: R) -> Result<PlaybackStats, ScriptError>
where
    V: ViewState,
    R: AsyncBufRead + Unpin,
{
    let mut stats = PlaybackStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(raw) = lines.next_line().await? {
        line_no += 1;
        match parse_line(line_no, &raw) {
            Ok(Some(ScriptLine::Event(event))) => {
                let response = viewer.handle_event(event);
                debug!(line = line_no, ?event, prevent_default = response.prevent_default, "script event");
                stats.events += 1;
                // Let the sync loop and any pending drag release run.
                tokio::task::yield_now().await;
            }
            Ok(Some(ScriptLine::Pause(delay))) => {
                stats.pauses += 1;
                tokio::time::sleep(delay).await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "script line skipped");
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
#[path = "script_test.rs"]
mod tests;
