pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use sitequote_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "sitequote",
    about = "Sitequote estimation CLI",
    long_about = "Run guided estimation conversations, one-shot estimates, and config inspection.",
    after_help = "Examples:\n  sitequote chat\n  sitequote estimate --service roofing --square-footage 2000 --location west --material tile --timeline standard\n  sitequote config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a sitequote.toml config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive estimation conversation on stdin/stdout")]
    Chat,
    #[command(about = "Compute a single estimate from fully specified inputs")]
    Estimate {
        #[arg(long, help = "Configured service type, e.g. roofing")]
        service: String,
        #[arg(long, help = "Project area in square feet")]
        square_footage: f64,
        #[arg(long, help = "Region name from the service's pricing table")]
        location: String,
        #[arg(long, help = "Material name from the service's pricing table")]
        material: String,
        #[arg(long, help = "Timeline name from the service's pricing table")]
        timeline: String,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let load_options = LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(load_options) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("config error: {error}");
            return ExitCode::from(2);
        }
    };
    init_logging(&config);

    let result = match cli.command {
        Command::Chat => commands::chat::run(config),
        Command::Estimate { service, square_footage, location, material, timeline, json } => {
            commands::estimate::run(
                &config,
                commands::estimate::EstimateArgs {
                    service,
                    square_footage,
                    location,
                    material,
                    timeline,
                    json,
                },
            )
        }
        Command::Config => commands::CommandResult::ok(commands::config::run(&config)),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // Chat shares stdout with the conversation, so logs go to stderr.
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(std::io::stderr);
    // try_init so a test harness that installed a subscriber first wins.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
