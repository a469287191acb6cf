//! waldur-settings
//!
//! Command line entry point: check, show and template the settings file,
//! render the test stack and probe the configured backends.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use waldur_settings::{
    config::{schema, LogLevel, Settings},
    services::{Event, EventLogger, ErrorReporter, ServiceFactory},
    topology::{self, ComposeFile},
    utils::{helpers::generate_secret_key, logging},
};

#[derive(Parser)]
#[command(name = "waldur-settings", version, about = "Waldur settings toolkit")]
struct Cli {
    /// Settings file; defaults to $WALDUR_CONFIG, then /etc/waldur/core.ini
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reject unknown sections and keys
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate the settings
    Check,
    /// Print the resolved settings with secrets masked
    Show {
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Print the annotated settings template
    Template,
    /// Print the test stack, or validate an existing compose file
    Compose {
        /// Compose file to validate instead of rendering one
        #[arg(long)]
        check: Option<PathBuf>,
        /// Write the rendered stack to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a fresh random secret key
    GenerateSecret,
    /// Probe the database and the Redis broker
    Ping,
    /// Deliver one event through the configured event sinks
    EmitEvent {
        #[arg(long = "type")]
        event_type: String,
        #[arg(long)]
        message: String,
        #[arg(long, default_value = "INFO")]
        level: LogLevel,
    },
    /// Report a message to the configured Sentry project
    Report {
        #[arg(long)]
        message: String,
        #[arg(long, default_value = "ERROR")]
        level: LogLevel,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Toml,
}

fn load_settings(path: Option<&Path>, strict: bool) -> anyhow::Result<Settings> {
    let settings = Settings::loader(path)
        .strict(strict)
        .load()
        .context("failed to load settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let Cli {
        config,
        strict,
        command,
    } = Cli::parse();
    let path = config.as_deref();

    match command {
        Command::Template => {
            print!("{}", schema::render_template());
        }
        Command::GenerateSecret => {
            println!("{}", generate_secret_key());
        }
        Command::Show { format } => {
            let settings = load_settings(path, strict)?.redacted();
            let rendered = match format {
                Format::Json => serde_json::to_string_pretty(&settings)?,
                Format::Toml => toml::to_string_pretty(&settings)?,
            };
            println!("{}", rendered);
        }
        Command::Compose { check: Some(file), .. } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let compose = ComposeFile::from_yaml(&text)?;
            compose.validate()?;
            let order = compose.startup_order()?;
            println!("{}: valid, startup order: {}", file.display(), order.join(", "));
        }
        Command::Compose { check: None, output } => {
            let settings = load_settings(path, strict)?;
            let rendered = topology::test_stack(&settings.postgresql).to_yaml()?;
            match output {
                Some(output) => std::fs::write(&output, rendered)
                    .with_context(|| format!("failed to write {}", output.display()))?,
                None => print!("{}", rendered),
            }
        }
        Command::Check => {
            let settings = load_settings(path, strict)?;
            let _guard = logging::init_logging(&settings.logging)?;
            if let Err(e) = settings.validate() {
                error!(error = %e, "Settings are invalid, the platform would refuse to start");
                return Err(e.into());
            }
            logging::log_settings_loaded(&settings);
            println!("Settings are valid");
        }
        Command::Ping => {
            let settings = load_settings(path, strict)?;
            let _guard = logging::init_logging(&settings.logging)?;
            settings.validate()?;

            let services = ServiceFactory::new(&settings).await?;
            let status = services.health_check().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.is_healthy() {
                bail!("one or more backends are unreachable");
            }
        }
        Command::EmitEvent {
            event_type,
            message,
            level,
        } => {
            let settings = load_settings(path, strict)?;
            let _guard = logging::init_logging(&settings.logging)?;
            settings.validate()?;

            let events = EventLogger::new(&settings.events).await?;
            let event = Event::new(event_type, message).with_level(level);
            let delivery = events.emit(&event).await?;
            if !delivery.delivered() {
                info!(event_type = %event.event_type, "Event was not delivered to any sink");
            }
            println!("{:?}", delivery);
        }
        Command::Report { message, level } => {
            let settings = load_settings(path, strict)?;
            let _guard = logging::init_logging(&settings.logging)?;
            settings.validate()?;

            let Some(reporter) = ErrorReporter::from_config(&settings.sentry)? else {
                bail!("[sentry] dsn is not configured");
            };
            let event_id = reporter.capture_message(&message, level).await?;
            println!("{}", event_id.simple());
        }
    }

    Ok(())
}
