//! Smart meter reader for DLMS/COSEM push telegrams
//!
//! Listens on the meter's serial port (or replays a raw capture), decodes
//! every push telegram and prints the register values as JSON lines.

mod publisher;
mod settings;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dlms_listener::{SessionController, TelegramPipeline};
use dlms_mapper::TelegramCatalog;
use dlms_transport::{LinkConnector, ReplayConnector, SerialConnector};
use publisher::PathTable;
use settings::{DEFAULT_CONFIG_FILE, Settings};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "dlms-meter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Read DLMS/COSEM push telegrams from a smart meter", long_about = None)]
struct Cli {
    /// Settings file; environment variables `DLMS__*` override it
    #[arg(short, long, env = "DLMS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for telegrams and publish them (default)
    Run {
        /// Read a recorded raw capture instead of the serial device
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,
    },
    /// Check every telegram definition document
    ValidateTelegrams {
        /// Defaults to `telegram.directory` of the settings
        dir: Option<PathBuf>,
    },
    /// Show the available telegram definitions
    ListTelegrams {
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Run { replay: None }) {
        Command::Run { replay } => run(settings, replay).await,
        Command::ValidateTelegrams { dir } => {
            let dir = dir.unwrap_or(settings.telegram.directory);
            validate_telegrams(&dir, &mut std::io::stdout())
        }
        Command::ListTelegrams { dir } => {
            let dir = dir.unwrap_or(settings.telegram.directory);
            list_telegrams(&dir, &mut std::io::stdout())
        }
    }
}

async fn run(settings: Settings, replay: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let catalog = TelegramCatalog::load(&settings.telegram.directory).with_context(|| {
        format!(
            "Failed to load telegram definitions from {}",
            settings.telegram.directory.display()
        )
    })?;
    let definition = catalog.definition(&settings.telegram.id)?;
    let keys = settings.security.keys()?;
    definition.check_keys(&keys)?;
    log::info!(
        "Using telegram '{}' ({}, {} registers)",
        definition.id(),
        definition.name(),
        definition.register_count()
    );

    let connector: Arc<dyn LinkConnector> = match replay {
        Some(path) => {
            if !path.is_file() {
                bail!("Capture {} does not exist", path.display());
            }
            Arc::new(ReplayConnector::new(path))
        }
        None => Arc::new(SerialConnector::new(settings.serial.to_settings()?)),
    };

    let pipeline = TelegramPipeline::from_definition(
        Arc::new(definition),
        keys,
        settings.listener.max_apdu_size,
    );
    let controller = SessionController::new(connector, pipeline, settings.listener)?;
    let handle = controller.handle();

    let cancel = CancellationToken::new();
    let publisher = tokio::spawn(publisher::publish_lines(
        handle,
        PathTable::victron(),
        std::io::stdout(),
    ));
    let mut session = tokio::spawn(controller.run(cancel.clone()));

    tokio::select! {
        joined = &mut session => joined.context("Session task failed")?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                log::error!("Cannot listen for Ctrl-C: {}", e);
            }
            log::info!("Shutting down");
            cancel.cancel();
            session.await.context("Session task failed")?;
        }
    }

    publisher.await.context("Publisher task failed")??;
    Ok(ExitCode::SUCCESS)
}

/// Report every problem of every document in `dir`, including duplicate ids
fn validate_telegrams(dir: &Path, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    let scanned = TelegramCatalog::scan(dir)?;
    if scanned.is_empty() {
        writeln!(out, "No telegram YAML files found.")?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut errors = Vec::new();
    let mut catalog = TelegramCatalog::default();
    let count = scanned.len();
    for document in scanned {
        let problems = document.problems();
        if !problems.is_empty() {
            let name = document.path.display().to_string();
            errors.extend(problems.into_iter().map(|p| format!("{}: {}", name, p)));
            continue;
        }
        if let Ok(parsed) = document.result {
            if let Err(e) = catalog.insert(document.path, parsed) {
                errors.push(e.to_string());
            }
        }
    }

    if errors.is_empty() {
        writeln!(out, "Validated {} telegram YAML files successfully.", count)?;
        Ok(ExitCode::SUCCESS)
    } else {
        writeln!(out, "Telegram template validation failed:")?;
        for error in &errors {
            writeln!(out, " - {}", error)?;
        }
        Ok(ExitCode::FAILURE)
    }
}

fn list_telegrams(dir: &Path, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    let catalog = TelegramCatalog::load(dir)
        .with_context(|| format!("Failed to load telegram definitions from {}", dir.display()))?;
    for document in catalog.documents() {
        let info = &document.info;
        writeln!(
            out,
            "{:<24} {} ({}, {}) {} registers{}",
            info.id,
            info.name,
            info.distributer,
            info.country,
            document.registers.len(),
            if info.required_keys.is_empty() {
                String::new()
            } else {
                format!(", requires {}", info.required_keys.join(" and "))
            }
        )?;
    }
    Ok(ExitCode::SUCCESS)
}
