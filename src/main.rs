pub mod types;
pub mod error;
pub mod config;
pub mod catalog;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the map of one disease to a standalone HTML file
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Disease code, or a "<code> - <description>" option
        #[arg(short, long)]
        disease: String,
        /// Variable label or key; repeat to stack circles, in order
        #[arg(short, long = "variable")]
        variables: Vec<String>,
        #[arg(short, long, value_name = "FILE", default_value = "mapa.html")]
        output: PathBuf,
    },
    /// List the disease options found in the data file
    Diseases {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// List the variables that can be drawn
    Variables {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, disease, variables, output } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let catalog = app_config.catalog();
            let cache = data::DatasetCache::new(app_config.input.clone());
            let dataset = cache.get_or_load()?;

            let mut fields = Vec::new();
            for name in variables {
                match catalog.resolve(name) {
                    Some(key) => fields.push(key.to_string()),
                    None => anyhow::bail!("Unknown variable: {}", name),
                }
            }
            let code = catalog::parse_disease_option(disease);
            let selection = types::Selection::new(code, fields);

            match processing::render_pass(&dataset, &selection, &catalog, &app_config.map)? {
                types::RenderOutcome::Rendered(view) => {
                    let title = format!("CID {}", code);
                    render::write_html(output, &view, &app_config.map, &title)?;
                    println!("Map with {} markers written to {:?}", view.markers.len(), output);
                    if view.skipped_without_location > 0 {
                        println!("{} records without latitude/longitude were left off.", view.skipped_without_location);
                    }
                }
                outcome => {
                    if let Some(warning) = outcome.warning() {
                        eprintln!("{}", warning);
                    }
                }
            }
        }
        Commands::Diseases { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = data::DatasetCache::new(app_config.input.clone()).get_or_load()?;
            for option in catalog::disease_options(&dataset) {
                println!("{}", option);
            }
        }
        Commands::Variables { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            for entry in app_config.catalog().entries() {
                println!("{}\t{}", entry.key, entry.label);
            }
        }
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;

            // Load before binding so a bad data file stops startup.
            let cache = data::DatasetCache::new(app_config.input.clone());
            let dataset = cache.get_or_load()?;

            server::start_server(app_config, dataset).await?;
        }
    }

    Ok(())
}
