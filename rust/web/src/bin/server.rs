//! Kazhutha game server
//!
//! Usage: cargo run -p kazhutha-web --bin kazhutha-server -- --port 8000

use clap::{Parser, ValueEnum};
use kazhutha_web::{init_logging, AppSettings, LogFormat, ServerConfig, WebServer};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogStyle {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl From<LogStyle> for LogFormat {
    fn from(style: LogStyle) -> Self {
        match style {
            LogStyle::Pretty => LogFormat::Pretty,
            LogStyle::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "kazhutha-server", version, about = "Multiplayer Kazhutha card game server")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(long, short, default_value_t = 8000)]
    port: u16,

    /// TOML settings file
    #[arg(long, env = "KAZHUTHA_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogStyle::Pretty)]
    log_format: LogStyle,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_logging(args.log_format.into())?;

    let settings = AppSettings::load(args.config.as_deref())?;
    tracing::info!(
        session_ttl_minutes = settings.session_ttl_minutes,
        finished_session_ttl_minutes = settings.finished_session_ttl_minutes,
        sweep_interval_secs = settings.sweep_interval_secs,
        keep_alive_secs = settings.keep_alive_secs,
        config = ?args.config,
        "settings loaded"
    );

    let config = ServerConfig::new(args.host, args.port);
    let server = WebServer::new(config, settings)?;
    let handle = server.start().await?;

    println!("Kazhutha server running at http://{}", handle.address());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down server");
    handle.shutdown().await?;

    Ok(())
}
