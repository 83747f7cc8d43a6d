#![allow(clippy::float_cmp)]

use std::sync::{Arc, Mutex};

use viewport::engine::ViewerOptions;
use viewport::image::{FetchError, ImageSource, RenderedImage, Surface};
use viewport::view::MandelbrotView;

use super::*;

// =============================================================================
// FAKES
// =============================================================================

/// Answers every fetch immediately.
struct InstantSource;

#[async_trait::async_trait]
impl ImageSource<MandelbrotView> for InstantSource {
    async fn fetch(&self, _view: &MandelbrotView) -> Result<RenderedImage, FetchError> {
        Ok(RenderedImage::new(vec![1, 2, 3], "image/png"))
    }
}

#[derive(Clone, Default)]
struct CountingSurface(Arc<Mutex<usize>>);

impl Surface for CountingSurface {
    fn mount(&mut self, _width: u32, _height: u32) {}

    fn replace_image(&mut self, _image: RenderedImage) {
        *self.0.lock().unwrap() += 1;
    }
}

fn viewer() -> Viewer<MandelbrotView> {
    Viewer::new(CountingSurface::default(), InstantSource, start(), ViewerOptions::default())
}

fn start() -> MandelbrotView {
    MandelbrotView::new(-0.5, 0.0, 0.0, 64, 64)
}

// =============================================================================
// parse_line
// =============================================================================

#[test]
fn blank_and_comment_lines_are_skipped() {
    assert_eq!(parse_line(1, "").unwrap(), None);
    assert_eq!(parse_line(2, "   ").unwrap(), None);
    assert_eq!(parse_line(3, "# pan right").unwrap(), None);
}

#[test]
fn gesture_events_parse() {
    assert_eq!(
        parse_line(1, r#"{"type":"drag_move","dx":4,"dy":-2}"#).unwrap(),
        Some(ScriptLine::Event(GestureEvent::DragMove { dx: 4.0, dy: -2.0, buttons: 0 }))
    );
    assert_eq!(
        parse_line(1, r#"{"type":"wheel","delta_y":-200,"delta_mode":0}"#).unwrap(),
        Some(ScriptLine::Event(GestureEvent::Wheel { delta_y: Some(-200.0), delta_mode: Some(0) }))
    );
    assert_eq!(parse_line(1, r#"  {"type":"drag_start"}  "#).unwrap(), Some(ScriptLine::Event(GestureEvent::DragStart)));
}

#[test]
fn pause_directive_parses() {
    assert_eq!(
        parse_line(1, r#"{"type":"pause","ms":250}"#).unwrap(),
        Some(ScriptLine::Pause(Duration::from_millis(250)))
    );
}

#[test]
fn unknown_line_reports_line_number() {
    let err = parse_line(7, r#"{"type":"teleport"}"#).unwrap_err();
    assert!(matches!(err, ScriptError::Parse { line: 7, .. }));
    assert!(err.to_string().starts_with("line 7:"));
}

#[test]
fn invalid_json_is_an_error() {
    assert!(parse_line(1, "drag_start").is_err());
}

// =============================================================================
// play
// =============================================================================

#[tokio::test(start_paused = true)]
async fn play_feeds_events_into_viewer() {
    let viewer = viewer();
    let script = b"# pan then zoom\n\
        {\"type\":\"drag_start\"}\n\
        {\"type\":\"drag_move\",\"dx\":10,\"dy\":0}\n\
        {\"type\":\"drag_end\"}\n\
        \n\
        {\"type\":\"wheel\",\"delta_y\":-200,\"delta_mode\":0}\n";

    let stats = play(&viewer, &script[..]).await.unwrap();
    assert_eq!(stats, PlaybackStats { events: 4, pauses: 0, skipped: 0 });

    let mut expected = start();
    expected.pan_by(10.0, 0.0);
    expected.zoom_by(1.0);
    assert_eq!(viewer.desired(), expected);
    viewer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn play_honors_pauses() {
    let viewer = viewer();
    let script = b"{\"type\":\"pause\",\"ms\":1500}\n{\"type\":\"drag_start\"}\n";

    let before = tokio::time::Instant::now();
    let stats = play(&viewer, &script[..]).await.unwrap();
    assert!(before.elapsed() >= Duration::from_millis(1500));
    assert_eq!(stats.pauses, 1);
    assert_eq!(stats.events, 1);
    viewer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_lines_are_skipped() {
    let viewer = viewer();
    let script = b"not json\n{\"type\":\"drag_move\",\"dx\":\"far\",\"dy\":0}\n{\"type\":\"touch_move\"}\n";

    let stats = play(&viewer, &script[..]).await.unwrap();
    assert_eq!(stats, PlaybackStats { events: 1, pauses: 0, skipped: 2 });
    assert_eq!(viewer.desired(), start());
    viewer.shutdown().await;
}
