use crate::config::{Config, Settings};
use crate::store::Store;
use crate::web::AppState;
use clap::Parser;
use eyre::WrapErr;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod gate;
mod lifecycle;
mod model;
mod store;
mod validation;
mod web;

#[derive(Parser)]
#[command(version, author, about)]
struct Args {
    #[arg(short, long, value_name = "FILE", help = "Use FILE instead of research-match.toml")]
    config: Option<PathBuf>,
    #[arg(short, long, value_name = "ADDR", help = "Listen on ADDR instead of server.bind")]
    bind: Option<SocketAddr>,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Set verbosity level")]
    verbose: u8,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let level = match args.verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("research_match={level},tower_http={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let mut settings = Settings::new(&config)?;
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }
    let store = Store::connect(&settings.database_url, settings.max_connections)
        .await
        .wrap_err_with(|| format!("cannot open database {}", settings.database_url))?;
    let app = web::router(AppState::new(store, &settings));
    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .wrap_err_with(|| format!("cannot listen on {}", settings.bind))?;
    info!(address = %settings.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
