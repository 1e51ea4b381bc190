pub mod company;
pub mod report;
pub mod track;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use company::{process_company_command, CompanyCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    context::{Tracker, TrackerConfig},
    model::CompanyId,
    pipeline::ViewState,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Hourly", version, long_about = None)]
#[command(about = "Track time against companies and see what you earned", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable trace logging to the console")]
    log: bool,
    #[arg(long = "log-filter", global = true, help = "Level of the file log")]
    log_filter: Option<LevelFilter>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Add, edit, remove and list companies")]
    Company {
        #[command(subcommand)]
        command: CompanyCommand,
    },
    #[command(about = "Earnings of every company that has logged time")]
    Dashboard {},
    #[command(about = "Everything logged for a single company")]
    Detail { id: CompanyId },
    #[command(about = "Track time for a company interactively")]
    Track { id: CompanyId },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        args.log_filter
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let tracker = Tracker::open(TrackerConfig {
        data_dir: Some(app_dir),
        ..Default::default()
    })
    .await?;

    let result = match args.commands {
        Commands::Company { command } => process_company_command(&tracker, command).await,
        Commands::Dashboard {} => report::print_dashboard(&tracker).await,
        Commands::Detail { id } => report::print_detail(&tracker, id).await,
        Commands::Track { id } => track::track(&tracker, id).await,
    };
    tracker.shutdown().await;
    result
}

/// Unwraps a loaded view, failing if it couldn't load.
fn loaded_value<T>(state: ViewState<T>) -> Result<T> {
    match state.error {
        Some(error) => bail!("{error}"),
        None => Ok(state.value),
    }
}
