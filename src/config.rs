//! Command-line and environment configuration.
//!
//! Every flag has a `MANDELVIEW_*` environment fallback. `Cli` is the raw
//! parsed form; [`Config::from_cli`] validates it into typed settings.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use viewport::consts::{DEBUG_LOG_CAPACITY, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RETRY_DELAY_MS};
use viewport::debug::DebugLog;
use viewport::engine::ViewerOptions;
use viewport::sync::SyncConfig;
use viewport::view::{MandelbrotView, Tolerance};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PATH: &str = "/img";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid query argument `{0}` (expected key=value)")]
    QueryArg(String),
    #[error("image path must start with '/': {0}")]
    Path(String),
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    Dimensions { width: u32, height: u32 },
    #[error("{name} must be finite and non-negative, got {value}")]
    Tolerance { name: &'static str, value: f64 },
    #[error("poll interval must be at least 1 ms")]
    PollInterval,
}

#[derive(Parser, Debug)]
#[command(name = "mandelview", about = "Interactive viewer for a remote Mandelbrot renderer")]
pub struct Cli {
    /// Renderer host.
    #[arg(long, env = "MANDELVIEW_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Renderer port.
    #[arg(long, env = "MANDELVIEW_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Image endpoint path on the renderer.
    #[arg(long, env = "MANDELVIEW_PATH", default_value = DEFAULT_PATH)]
    pub path: String,

    /// Extra image-quality query argument, `key=value`. Repeatable.
    #[arg(long = "query-arg", env = "MANDELVIEW_QUERY_ARGS", value_delimiter = ',')]
    pub query_args: Vec<String>,

    /// Initial center, real part.
    #[arg(long, default_value_t = -0.5, allow_negative_numbers = true)]
    pub x: f64,

    /// Initial center, imaginary part.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub y: f64,

    /// Initial zoom level.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub zoom: f64,

    #[arg(long, env = "MANDELVIEW_WIDTH", default_value_t = 800)]
    pub width: u32,

    #[arg(long, env = "MANDELVIEW_HEIGHT", default_value_t = 600)]
    pub height: u32,

    /// Idle re-check interval.
    #[arg(long, env = "MANDELVIEW_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Abandon a fetch after this long; 0 waits forever.
    #[arg(long, env = "MANDELVIEW_FETCH_TIMEOUT_MS", default_value_t = DEFAULT_FETCH_TIMEOUT_MS)]
    pub fetch_timeout_ms: u64,

    /// Back-off after a failed fetch.
    #[arg(long, env = "MANDELVIEW_RETRY_DELAY_MS", default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Center drift, in pixels, still treated as the same view.
    #[arg(long, env = "MANDELVIEW_TOLERANCE_PX", default_value_t = 0.0, allow_negative_numbers = true)]
    pub tolerance_px: f64,

    /// Zoom drift still treated as the same view.
    #[arg(long, env = "MANDELVIEW_TOLERANCE_ZOOM", default_value_t = 0.0, allow_negative_numbers = true)]
    pub tolerance_zoom: f64,

    /// Directory the current image is written to.
    #[arg(long, env = "MANDELVIEW_OUT_DIR", default_value = "mandelview-out")]
    pub out_dir: PathBuf,

    /// Gesture script (JSON lines); stdin when absent.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Keep syncing this long after the script ends.
    #[arg(long, default_value_t = 2000)]
    pub linger_ms: u64,

    /// Record diagnostic lines and log at DEBUG level.
    #[arg(long, env = "MANDELVIEW_DEBUG")]
    pub debug: bool,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub query_args: Vec<(String, String)>,
    pub view: MandelbrotView,
    pub sync: SyncConfig,
    pub connect_timeout: Duration,
    pub out_dir: PathBuf,
    pub script: Option<PathBuf>,
    pub linger: Duration,
    pub debug: bool,
}

impl Config {
    /// Validate parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed query arguments, a relative image
    /// path, zero dimensions, a negative tolerance or a zero poll interval.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if !cli.path.starts_with('/') {
            return Err(ConfigError::Path(cli.path));
        }
        if cli.width == 0 || cli.height == 0 {
            return Err(ConfigError::Dimensions { width: cli.width, height: cli.height });
        }
        if cli.poll_interval_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        let tolerance = Tolerance::new(
            check_tolerance("tolerance-px", cli.tolerance_px)?,
            check_tolerance("tolerance-zoom", cli.tolerance_zoom)?,
            0.0,
        );
        let query_args = cli
            .query_args
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_query_arg(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let sync = SyncConfig {
            poll_interval: Duration::from_millis(cli.poll_interval_ms),
            fetch_timeout: (cli.fetch_timeout_ms > 0).then(|| Duration::from_millis(cli.fetch_timeout_ms)),
            retry_delay: Duration::from_millis(cli.retry_delay_ms),
            tolerance,
        };

        Ok(Self {
            base_url: format!("http://{}:{}{}", cli.host, cli.port, cli.path),
            query_args,
            view: MandelbrotView::new(cli.x, cli.y, cli.zoom, cli.width, cli.height),
            sync,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            out_dir: cli.out_dir,
            script: cli.script,
            linger: Duration::from_millis(cli.linger_ms),
            debug: cli.debug,
        })
    }

    #[must_use]
    pub fn viewer_options(&self) -> ViewerOptions {
        let debug = if self.debug { DebugLog::enabled(DEBUG_LOG_CAPACITY) } else { DebugLog::disabled() };
        ViewerOptions { sync: self.sync, debug }
    }
}

fn parse_query_arg(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.trim().to_string())),
        _ => Err(ConfigError::QueryArg(raw.to_string())),
    }
}

fn check_tolerance(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 { Ok(value) } else { Err(ConfigError::Tolerance { name, value }) }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
