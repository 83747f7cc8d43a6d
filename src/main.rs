mod config;
mod http;
mod script;
mod surface;

use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::Level;
use viewport::engine::Viewer;

use crate::config::{Cli, Config, ConfigError};
use crate::http::HttpImageSource;
use crate::script::ScriptError;
use crate::surface::FileSurface;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("image source: {0}")]
    Source(#[from] viewport::image::FetchError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("debug log not written: {0}")]
    DebugLog(std::io::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "mandelview failed");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_cli(cli)?;
    tracing::info!(url = %config.base_url, out_dir = %config.out_dir.display(), "renderer configured");

    let source = HttpImageSource::new(&config.base_url, config.query_args.clone(), config.connect_timeout)?;
    let surface = FileSurface::new(&config.out_dir);
    let viewer = Viewer::new(surface, source, config.view.clone(), config.viewer_options());

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &config.script {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(ScriptError::Io)?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let stats = script::play(&viewer, reader).await?;
    tracing::info!(events = stats.events, pauses = stats.pauses, skipped = stats.skipped, "script finished");

    tokio::time::sleep(config.linger).await;
    let status = viewer.status();
    tracing::info!(state = ?status.state, available = ?status.available, "shutting down");

    let debug = viewer.debug_log().clone();
    viewer.shutdown().await;

    if debug.is_enabled() {
        let path = config.out_dir.join("debug.log");
        let mut text = debug.lines().join("\n");
        text.push('\n');
        tokio::fs::write(&path, text).await.map_err(AppError::DebugLog)?;
        tracing::info!(path = %path.display(), "debug log written");
    }
    Ok(())
}
