//! grove - command-line interface for the engine supervisor.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use grove::monitor::{check_thresholds, MetricsSource, ProcSource};
use grove::{
    BackendRegistry, Config, EngineStatus, PluginManager, StartOutcome, StatePaths, StopOutcome,
    Supervisor,
};

/// Supervisor for inference engine worker processes
#[derive(Debug, Parser)]
#[command(name = "grove")]
#[command(about = "Supervisor for inference engine worker processes")]
#[command(version)]
struct Cli {
    /// State directory (registries, PID files, logs)
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an engine worker
    Start {
        /// Engine type
        engine: String,

        /// Model to serve
        model: Option<String>,

        /// Extra launch options, key=value
        #[arg(short = 'o', long = "option", value_parser = parse_key_val)]
        options: Vec<(String, String)>,
    },

    /// Stop an engine worker (all of the engine's workers if no model given)
    Stop {
        engine: String,
        model: Option<String>,
    },

    /// Register a model and start a worker serving it
    Load { engine: String, model: String },

    /// Stop a model's worker and mark it unloaded
    Unload { model: String },

    /// Show every supervised instance
    Status,

    /// Health-check workers, cleaning up stale PID files
    Health {
        engine: Option<String>,
        model: Option<String>,
    },

    /// List catalogued engine backends
    #[command(name = "list-engines")]
    ListEngines,

    /// List registered models
    #[command(name = "list-models")]
    ListModels {
        /// Filter by engine type
        #[arg(short, long)]
        engine: Option<String>,
    },

    /// Sample resource utilization and report threshold violations
    Monitor,

    /// Manage installable plugins
    Plugin {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Debug, Subcommand)]
enum PluginCommands {
    /// Materialize a plugin bundle into the managed directory
    Install {
        /// Bundle file or directory
        source: PathBuf,

        /// Plugin name (defaults to the bundle's file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Entry point inside the bundle
        #[arg(short, long)]
        entry: Option<String>,

        #[arg(long, default_value = "0.1.0")]
        version: String,

        /// Capability strings recorded as metadata
        #[arg(short, long = "permission")]
        permissions: Vec<String>,
    },

    /// Stop a plugin and remove its directory and record
    Uninstall { name: String },

    /// Start a plugin worker
    Start { name: String },

    /// Stop a plugin worker
    Stop { name: String },

    /// Probe a plugin worker
    Status { name: String },

    /// List installed plugins
    List,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> grove::Result<()> {
    let paths = match &cli.state_dir {
        Some(dir) => StatePaths::in_dir(dir),
        None => StatePaths::new(),
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| paths.state_dir.join("config.json"));
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Start {
            engine,
            model,
            options,
        } => {
            let supervisor = Supervisor::new(paths, config, BackendRegistry::builtin())?;
            match supervisor.start(&engine, model.as_deref(), &options)? {
                StartOutcome::Started { pid } => println!("started (pid {})", pid),
                StartOutcome::AlreadyRunning { pid } => {
                    println!("already running (pid {})", pid)
                }
            }
        }

        Commands::Stop { engine, model } => {
            let supervisor = Supervisor::new(paths, config, BackendRegistry::builtin())?;
            match supervisor.stop(&engine, model.as_deref())? {
                StopOutcome::Stopped { pid } => println!("stopped (pid {})", pid),
                StopOutcome::NotRunning => println!("not running"),
            }
        }

        Commands::Load { engine, model } => {
            let supervisor = Supervisor::new(paths, config, BackendRegistry::builtin())?;
            match supervisor.load(&engine, &model)? {
                StartOutcome::Started { pid } => println!("loaded (pid {})", pid),
                StartOutcome::AlreadyRunning { pid } => {
                    println!("already loaded (pid {})", pid)
                }
            }
        }

        Commands::Unload { model } => {
            let supervisor = Supervisor::new(paths, config, BackendRegistry::builtin())?;
            supervisor.unload(&model)?;
            println!("unloaded {}", model);
        }

        Commands::Status => {
            let limits = config.limits.clone();
            let supervisor = Supervisor::new(paths, config, BackendRegistry::builtin())?;
            let instances = supervisor.status()?;
            if instances.is_empty() {
                println!("no supervised instances");
            }
            for instance in instances {
                println!(
                    "{:<32} {:<8} pid {:<8} since {}",
                    instance.key,
                    instance.status,
                    instance.pid,
                    instance.start_time.to_rfc3339()
                );
            }

            // Advisory only: log threshold violations, never act on them
            if let Ok(sample) = ProcSource::new().sample() {
                for violation in check_thresholds(&sample, &limits) {
                    tracing::warn!("Resource threshold exceeded: {}", violation);
                }
            }
        }

        Commands::Health { engine, model } => {
            let supervisor = Supervisor::new(paths, config, BackendRegistry::builtin())?;
            let engines: Vec<String> = match engine {
                Some(engine) => vec![engine],
                None => supervisor
                    .backends()
                    .engine_types()
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
            };
            for engine in engines {
                for report in supervisor.health_check(&engine, model.as_deref())? {
                    match report.uptime {
                        Some(uptime) => println!(
                            "{:<32} {:<8} pid {:<8} up {}s",
                            report.key,
                            report.status,
                            report.pid.unwrap_or(0),
                            uptime.as_secs()
                        ),
                        None => println!("{:<32} {}", report.key, report.status),
                    }
                }
            }
        }

        Commands::ListEngines => {
            let backends = BackendRegistry::builtin();
            for engine_type in backends.engine_types() {
                let backend = backends.describe(engine_type)?;
                println!(
                    "{:<16} {:<4} ({})",
                    backend.name(),
                    backend.resource_class(),
                    backend.command_identity()
                );
            }
        }

        Commands::ListModels { engine } => {
            let supervisor = Supervisor::new(paths, config, BackendRegistry::builtin())?;
            for record in supervisor.models().list(engine.as_deref())? {
                println!(
                    "{:<32} {:<12} {:<8} {}",
                    record.name,
                    record.engine_type,
                    if record.loaded { "loaded" } else { "unloaded" },
                    record.storage_path.display()
                );
            }
        }

        Commands::Monitor => {
            let sample = ProcSource::new().sample()?;
            match sample.gpu_pct {
                Some(gpu) => println!(
                    "cpu {:.1}%  mem {:.1}%  gpu {:.1}%",
                    sample.cpu_pct, sample.mem_pct, gpu
                ),
                None => println!("cpu {:.1}%  mem {:.1}%", sample.cpu_pct, sample.mem_pct),
            }
            for violation in check_thresholds(&sample, &config.limits) {
                tracing::warn!("Resource threshold exceeded: {}", violation);
            }
        }

        Commands::Plugin { command } => {
            let manager = PluginManager::new(paths, config)?;
            match command {
                PluginCommands::Install {
                    source,
                    name,
                    entry,
                    version,
                    permissions,
                } => {
                    let record = manager.install(
                        &source,
                        name.as_deref(),
                        entry.as_deref(),
                        &version,
                        permissions,
                    )?;
                    println!("installed {} {}", record.name, record.version);
                }
                PluginCommands::Uninstall { name } => {
                    manager.uninstall(&name)?;
                    println!("uninstalled {}", name);
                }
                PluginCommands::Start { name } => match manager.start(&name)? {
                    StartOutcome::Started { pid } => println!("started (pid {})", pid),
                    StartOutcome::AlreadyRunning { pid } => {
                        println!("already running (pid {})", pid)
                    }
                },
                PluginCommands::Stop { name } => match manager.stop(&name)? {
                    StopOutcome::Stopped { pid } => println!("stopped (pid {})", pid),
                    StopOutcome::NotRunning => println!("not running"),
                },
                PluginCommands::Status { name } => {
                    let (record, report) = manager.status(&name)?;
                    let runtime = match report.status {
                        EngineStatus::Running => "active".to_string(),
                        _ => record.status.to_string(),
                    };
                    println!(
                        "{:<24} {:<10} v{} {}",
                        record.name,
                        runtime,
                        record.version,
                        record.entry_point.display()
                    );
                }
                PluginCommands::List => {
                    for record in manager.list()? {
                        println!(
                            "{:<24} {:<10} v{} [{}]",
                            record.name,
                            record.status,
                            record.version,
                            record
                                .permissions
                                .iter()
                                .cloned()
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
