use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Ships line-delimited JSON log files to a remote index", long_about = None)]
struct Cli {
    /// Load configuration from this file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use this registry database file (overrides the config value)
    #[arg(short, long)]
    registry: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skiff=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = match resolve_config_path(cli.config) {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ./skiff.yml");
            eprintln!("  ~/.config/skiff/config.yml");
            eprintln!("  /etc/skiff/config.yml");
            eprintln!("\nUse --config <path> to specify a config file.");
            std::process::exit(1);
        }
    };

    skiff::cli::run::run(config_path, cli.registry).await?;
    Ok(())
}

fn resolve_config_path(explicit_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path);
    }

    let local_config = PathBuf::from("skiff.yml");
    if local_config.exists() {
        return Some(local_config);
    }

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/skiff/config.yml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/skiff/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}
