use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sideload::config::Config;
use sideload::daemon;
use sideload::engine::Engine;
use sideload::fs::{locking::ProcessLock, markers, queue_state};
use sideload::metadata::ParamJsonReader;
use sideload::models::QueueState;
use sideload::notify::ToastNotifier;
use sideload::stability::SizeStabilityGate;
use sideload::system::{BindMounter, CommandRegistrar};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sideload")]
#[command(about = "Unattended title install daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the install daemon (backgrounds itself by default)
    Run {
        /// Stay attached to the terminal instead of daemonizing
        #[arg(long)]
        foreground: bool,
    },

    /// Signal a running daemon to shut down gracefully
    Stop,

    /// Show the persisted install queue
    Status,

    /// Reset a failed title so it is attempted again next cycle
    Retry {
        /// Title id of the failed entry
        title_id: String,
    },

    /// Mark every completed title for reprocessing on the next cycle
    Reinstall,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { foreground } => run(config, foreground),
        Commands::Stop => stop(config),
        Commands::Status => status(config),
        Commands::Retry { title_id } => retry(config, &title_id),
        Commands::Reinstall => reinstall(config),
    }
}

fn run(config: Config, foreground: bool) -> Result<()> {
    // The only fatal, side-effect-free exit: another instance holds the
    // lock. Acquired before daemonizing so the failure is visible.
    let _lock = ProcessLock::acquire(&config.lock_path())?;

    if !foreground {
        daemon::daemonize(&config)?;
    }

    let notifier = ToastNotifier::new(config.notify_file.clone());
    let gate = SizeStabilityGate::new(&config);
    let registrar = CommandRegistrar::new(config.register_command.clone());

    let mut engine = Engine::new(
        config.clone(),
        Box::new(ParamJsonReader),
        Box::new(gate),
        Box::new(BindMounter),
        Box::new(registrar),
        Box::new(notifier),
    )?;

    let flag = engine.shutdown_flag();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })?;

    let result = engine.run();
    daemon::cleanup(&config)?;
    result
}

fn stop(config: Config) -> Result<()> {
    let path = markers::request_shutdown(&config.state_dir)?;
    println!(
        "Shutdown requested ({}); the daemon exits at the top of its next cycle.",
        path.display()
    );
    Ok(())
}

fn status(config: Config) -> Result<()> {
    let entries = queue_state::list_entries(&config.state_dir)?;
    if entries.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for entry in entries {
        let state = match entry.state {
            QueueState::Done => "Done".green(),
            QueueState::Error => "Error".red(),
            QueueState::Installing => "Installing".yellow(),
            QueueState::Pending => "Pending".cyan(),
        };
        println!(
            "{:<12} {:<10} retries={} {}",
            entry.title_id,
            state,
            entry.retry_count,
            entry.title_name.dimmed()
        );
    }
    Ok(())
}

fn retry(config: Config, title_id: &str) -> Result<()> {
    let Some(mut entry) = queue_state::read_entry_if_exists(&config.state_dir, title_id)? else {
        bail!("No queue record for title: {title_id}");
    };

    if entry.state != QueueState::Error {
        bail!(
            "Title '{}' is {}, only Error entries can be retried",
            title_id,
            entry.state
        );
    }

    entry.reset_for_retry()?;
    queue_state::write_entry(&config.state_dir, &entry)?;
    println!("Title '{title_id}' reset; it will be retried next cycle.");
    Ok(())
}

fn reinstall(config: Config) -> Result<()> {
    let path = markers::request_force_reinstall(&config.state_dir)?;
    println!(
        "Force-reinstall requested ({}); completed titles reprocess next cycle.",
        path.display()
    );
    Ok(())
}
