use clap::Parser;
use log::{info, warn};
use server::config::ServerConfig;
use server::maps::MapFileLoader;
use server::network::NetworkServer;
use server::player::NameRules;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; built-in defaults are used when absent
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the MapaN.map / .inf / .dat files
    #[arg(short, long)]
    maps_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => {
            warn!("No config file given, using defaults");
            ServerConfig::default()
        }
    };
    if let Some(host) = args.host {
        config.network.host = host;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(path) = args.maps_path {
        config.maps.path = path;
    }
    config.validate()?;

    let names = match &config.world.forbidden_names_file {
        Some(path) => NameRules::load(path),
        None => NameRules::default(),
    };
    info!(
        "Starting server: {} maps from {} ({:?} loading), {} forbidden names",
        config.maps.count,
        config.maps.path.display(),
        config.maps.loading,
        names.forbidden_count()
    );

    let loader = Arc::new(MapFileLoader::new(config.maps.path.clone()));
    let server = NetworkServer::bind(config, loader, names).await?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
