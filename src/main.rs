// src/main.rs - Command line host for the pen plotter
use clap::{Parser, Subcommand};
use penplot_rs::config::PlotterConfig;
use penplot_rs::errors::{BoxError, Category, PlotterError, RecoveryAction, registry};
use penplot_rs::executor::{PageFormat, PageSide, PlotExecutor, ProgressHub, RunOptions, parse_program};
use penplot_rs::protocol::GrblPlotter;
use penplot_rs::recovery::Recovery;
use penplot_rs::sim::{SIM_PORT, SimulatedPlotter};
use penplot_rs::transport::{Connection, SerialBackend, SerialSettings, SystemSerial};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "penplot", about = "Drive a GRBL pen plotter over USB serial.")]
struct Cli {
    /// Path to a TOML config file (defaults apply when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device; overrides the config file and PENPLOT_PORT
    #[arg(short, long)]
    port: Option<String>,

    /// Talk to an in-process simulated plotter instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports {
        /// Include ports without a known controller chip
        #[arg(long)]
        all: bool,
    },
    /// Connect and print controller status
    Status,
    /// Run the homing cycle
    Home,
    /// Plot a JSON instruction file
    Plot {
        file: PathBuf,
        #[arg(long, default_value = "front")]
        side: PageSide,
        /// Paper format (A4 or A3)
        #[arg(long)]
        page: Option<String>,
        #[arg(long)]
        no_voltage_check: bool,
        #[arg(long)]
        no_pause_button: bool,
    },
    /// Move the pen (raised) to a machine position
    MoveTo {
        x: f64,
        y: f64,
        #[arg(long, default_value_t = 50.0)]
        speed: f64,
    },
    /// Draw a square with diagonals at the current position
    TestPattern {
        #[arg(long, default_value_t = 10.0)]
        size: f64,
        #[arg(long, default_value_t = 30.0)]
        speed: f64,
    },
    /// List the error catalog
    Errors {
        #[arg(long)]
        category: Option<String>,
        /// Only problems an operator can report
        #[arg(long)]
        user_reportable: bool,
    },
    /// Print the full report for one error code
    Explain { code: String },
    /// Report a problem observed by the operator (ink, paper, quality)
    Report {
        code: String,
        /// Extra context as key=value
        #[arg(long = "context", value_parser = parse_key_val)]
        context: Vec<(String, String)>,
    },
    /// Run a recovery action
    Recover { action: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

struct Host {
    config: PlotterConfig,
    plotter: Arc<GrblPlotter>,
}

impl Host {
    fn new(config: PlotterConfig, simulate: bool) -> Self {
        let backend: Arc<dyn SerialBackend> = if simulate {
            Arc::new(SimulatedPlotter::new())
        } else {
            Arc::new(SystemSerial)
        };
        let conn = Arc::new(Connection::new(backend, SerialSettings::from(&config.serial)));
        let plotter = Arc::new(GrblPlotter::new(conn, &config.pen, config.motion.clone()));
        Self { config, plotter }
    }

    async fn connect(&self) -> Result<(), PlotterError> {
        self.plotter
            .connection()
            .connect(self.config.serial.port.as_deref())
            .await?;
        self.plotter.initialize().await
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            PlotterConfig::load(path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path.display(), e);
                Box::new(e) as BoxError
            })?
        }
        None => PlotterConfig::default(),
    };
    if let Ok(port) = std::env::var("PENPLOT_PORT") {
        config.serial.port = Some(port);
    }
    if let Some(port) = &cli.port {
        config.serial.port = Some(port.clone());
    }
    if cli.simulate {
        config.serial.port = Some(SIM_PORT.to_string());
        config.homing.settle_ms = 0;
        config.homing.positioning_settle_ms = 0;
    }

    match run(cli.command, config, cli.simulate).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(plotter_error) = e.downcast_ref::<PlotterError>() {
                eprintln!("{}", serde_json::to_string_pretty(&plotter_error.to_report())?);
            }
            Err(e)
        }
    }
}

async fn run(command: Command, config: PlotterConfig, simulate: bool) -> Result<(), BoxError> {
    match command {
        Command::Ports { all } => {
            let host = Host::new(config, simulate);
            for port in host.plotter.connection().list_ports() {
                if all || port.compatible {
                    println!(
                        "{}\t{}\t{}\t{}",
                        port.device,
                        port.device_name.as_deref().unwrap_or("-"),
                        port.description,
                        port.hwid
                    );
                }
            }
        }
        Command::Status => {
            let host = Host::new(config, simulate);
            host.connect().await?;
            let device = host.plotter.query_status().await?;
            println!("{}", serde_json::to_string_pretty(&host.plotter.status())?);
            println!("{}", serde_json::to_string_pretty(&device)?);
        }
        Command::Home => {
            let host = Host::new(config, simulate);
            host.connect().await?;
            host.plotter.home(host.config.homing.timeout()).await?;
            let (x, y) = host.plotter.current_position();
            println!("Homed at ({:.3}, {:.3})", x, y);
        }
        Command::Plot { file, side, page, no_voltage_check, no_pause_button } => {
            let mut config = config;
            if let Some(name) = page {
                let format = PageFormat::from_name(&name).ok_or_else(|| format!("unknown page format '{}'", name))?;
                format.apply(&mut config.page);
            }
            let program = parse_program(&std::fs::read_to_string(&file)?)?;
            tracing::info!("Loaded {} instructions from {}", program.len(), file.display());

            let host = Host::new(config, simulate);
            host.connect().await?;
            let executor = PlotExecutor::new(host.plotter.clone(), &host.config);

            let hub = Arc::new(ProgressHub::new());
            let mut updates = hub.subscribe();
            tokio::spawn(async move {
                while let Some(p) = updates.recv().await {
                    tracing::info!(
                        "{:?} {}/{} ({:.0}%)",
                        p.state,
                        p.current_command,
                        p.total_commands,
                        p.percentage
                    );
                }
            });

            let control = executor.control();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling plot");
                    control.cancel();
                }
            });

            let options = RunOptions {
                check_voltage: !no_voltage_check,
                poll_pause_button: !no_pause_button,
            };
            let completed = executor.execute(&program, side, options, hub.as_ref()).await?;
            println!("{}", if completed { "Plot completed" } else { "Plot cancelled" });
        }
        Command::MoveTo { x, y, speed } => {
            let host = Host::new(config, simulate);
            host.connect().await?;
            host.plotter.move_to_position(x, y, speed).await?;
        }
        Command::TestPattern { size, speed } => {
            let host = Host::new(config, simulate);
            host.connect().await?;
            host.plotter.draw_test_pattern(size, speed).await?;
        }
        Command::Errors { category, user_reportable } => {
            let category = match category {
                Some(c) => Some(Category::parse(&c).ok_or_else(|| format!("unknown category '{}'", c))?),
                None => None,
            };
            for def in registry().iter() {
                if category.is_some_and(|c| c != def.category) || (user_reportable && def.auto_detected) {
                    continue;
                }
                println!("{}\t{:?}\t{}\t{}", def.code, def.severity, def.category, def.name);
            }
        }
        Command::Explain { code } => {
            let report = PlotterError::new(code.as_str()).to_report();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Report { code, context } => {
            let host = Host::new(config, simulate);
            let recovery = Recovery::new(host.plotter.clone(), &host.config);
            let context: BTreeMap<String, Value> = context.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
            let error = recovery.report_problem(&code, context)?;
            println!("{}", serde_json::to_string_pretty(&error.to_report())?);
        }
        Command::Recover { action } => {
            let action = RecoveryAction::parse(&action).ok_or_else(|| format!("unknown recovery action '{}'", action))?;
            let host = Host::new(config, simulate);
            if action != RecoveryAction::Reconnect {
                host.connect().await?;
            }
            let recovery = Recovery::new(host.plotter.clone(), &host.config);
            let outcome = recovery.perform(action).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
    }
    Ok(())
}
