use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use sunsynk_rs::settings::{Settings, OPTIONS_FILE};
use sunsynk_rs::sync::Pipeline;
use sunsynk_rs::Error;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the options file
    #[arg(short, long, env = "SUNSYNK_CONFIG", default_value = OPTIONS_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Push a JSON settings document to one inverter and exit
    ApplySettings {
        /// Inverter serial number
        serial: String,
        /// JSON file with the settings to write
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn read_settings_file(path: &Path) -> Result<serde_json::Value, Error> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("unable to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
}

async fn apply_settings(settings: &Settings, serial: &str, path: &Path) -> Result<(), Error> {
    settings.validate_upstream()?;
    let document = read_settings_file(path)?;
    Pipeline::new(settings.context())?
        .apply_settings(serial, &document)
        .await
}

async fn serve(settings: &Settings) -> Result<(), Error> {
    settings.validate()?;
    let mut pipeline = Pipeline::new(settings.context())?;
    if let Some(dir) = pipeline.context().diagnostics.dir() {
        log::info!("Raw documents are kept in {}", dir.display());
    }
    pipeline.run().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(false);
            log::error!("{}", e);
            process::exit(1);
        }
    };
    init_logging(settings.verbose);

    let result = match &args.command {
        None => serve(&settings).await,
        Some(Command::ApplySettings { serial, file }) => {
            apply_settings(&settings, serial, file).await
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        process::exit(1);
    }
}
