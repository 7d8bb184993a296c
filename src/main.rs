pub mod types;
pub mod config;
pub mod topology;
pub mod data;
pub mod processing;
pub mod color;
pub mod projection;
pub mod view;
pub mod session;
pub mod render;
pub mod server;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a static HTML page with the choropleth map
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "FILE", default_value = "map.html")]
        output: PathBuf,
        /// Focus the feature with this id before rendering
        #[arg(long, value_name = "ID")]
        focus: Option<String>,
    },
    /// Serve the interactive map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the joined features and their colors
    Inspect {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

async fn load_session(config: &config::AppConfig) -> Result<session::MapSession> {
    let datasets = data::acquire(config).await?;
    Ok(session::MapSession::new(&config.map, datasets))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, output, focus } => {
            info!("rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let mut session = load_session(&app_config).await?;

            if let Some(id) = focus {
                let index = session.features().iter()
                    .position(|view| view.feature.id.as_deref() == Some(id.as_str()))
                    .ok_or_else(|| anyhow!("No feature with id '{}'", id))?;
                session.select(index, None);
            }

            // A static page shows the final view, not the transition into it
            let page = render::render_page(&session, None, render::RenderOptions { interactive: false });
            tokio::fs::write(output, page).await
                .with_context(|| format!("Failed to write {:?}", output))?;
            info!("wrote {:?}", output);
        }
        Commands::Serve { config } => {
            info!("serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let session = load_session(&app_config).await?;
            server::start_server(app_config, session).await?;
        }
        Commands::Inspect { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let session = load_session(&app_config).await?;

            println!("{:<6} {:<24} {:>10} {:>12} {:>10}  color", "id", "name", "per cap", "avg daily", "mortality");
            for summary in session.summaries() {
                println!(
                    "{:<6} {:<24} {:>10} {:>12} {:>10}  {}",
                    summary.id.as_deref().unwrap_or("-"),
                    summary.name.as_deref().unwrap_or("-"),
                    render::format_number(summary.jail_pop_per_cap),
                    render::format_number(summary.avg_daily_pop),
                    render::format_number(summary.mortality_rate),
                    summary.color,
                );
            }
        }
    }

    Ok(())
}
