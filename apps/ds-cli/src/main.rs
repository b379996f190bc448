mod config;
mod error;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ds_sim::{CarrierComparison, CarrierEdge, SimOutcome, SimRecord, SimReport, run_sweep};

use crate::config::DriveConfig;
use crate::error::{CliError, CliResult};

#[derive(Parser)]
#[command(name = "ds-cli")]
#[command(about = "DriveSim CLI - switched motor-drive simulation", long_about = None)]
struct Cli {
    /// Log per-period progress (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a drive described by a YAML file
    Run {
        /// Path to the drive YAML file
        config_path: PathBuf,
        /// Override the stop time (s)
        #[arg(long)]
        t_stop: Option<f64>,
        /// Write the trajectory as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the carrier-comparison segments for fixed duty ratios
    Segments {
        /// Half carrier period (s)
        #[arg(long)]
        t_s: f64,
        /// Duty ratios of phases a, b and c
        #[arg(num_args = 3, required = true)]
        duty: Vec<f64>,
        /// Counter resolution
        #[arg(long, default_value_t = CarrierComparison::DEFAULT_LEVELS)]
        levels: u32,
        /// Number of consecutive half periods
        #[arg(long, default_value_t = 2)]
        periods: usize,
        /// Start on the falling carrier edge
        #[arg(long)]
        falling: bool,
    },
    /// Run one drive per final frequency, in parallel
    Sweep {
        /// Path to the drive YAML file
        config_path: PathBuf,
        /// Final electrical frequencies (rad/s), comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        w_final: Vec<f64>,
    },
    /// Print the default drive description
    DefaultConfig,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    completed: bool,
    abort_reason: Option<String>,
    t: f64,
    periods: usize,
    segments: usize,
    steps: usize,
    final_state: Vec<(String, f64)>,
}

impl RunSummary {
    fn new(report: &SimReport, record: &SimRecord) -> Self {
        let final_state = record
            .x
            .last()
            .map(|x| record.labels.iter().cloned().zip(x.iter().copied()).collect())
            .unwrap_or_default();
        let abort_reason = match &report.outcome {
            SimOutcome::Completed => None,
            SimOutcome::Aborted { reason, .. } => Some(reason.to_string()),
        };
        Self {
            completed: report.outcome.is_completed(),
            abort_reason,
            t: report.t,
            periods: report.periods,
            segments: report.segments,
            steps: report.steps,
            final_state,
        }
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config_path,
            t_stop,
            output,
            json,
        } => cmd_run(&config_path, t_stop, output.as_deref(), json),
        Commands::Segments {
            t_s,
            duty,
            levels,
            periods,
            falling,
        } => cmd_segments(t_s, &duty, levels, periods, falling),
        Commands::Sweep {
            config_path,
            w_final,
        } => cmd_sweep(&config_path, w_final),
        Commands::DefaultConfig => {
            print!("{}", DriveConfig::default().to_yaml()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(
    config_path: &Path,
    t_stop: Option<f64>,
    output: Option<&Path>,
    json: bool,
) -> CliResult<()> {
    let mut config = DriveConfig::load(config_path)?;
    if let Some(t_stop) = t_stop {
        config.sim.t_stop = t_stop;
    }

    let started = Instant::now();
    let mut sim = config.simulation()?;
    let report = sim.simulate();
    let wall = started.elapsed().as_secs_f64();
    let record = sim.take_record();
    let summary = RunSummary::new(&report, &record);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, wall);
    }

    if let Some(path) = output {
        std::fs::write(path, record_csv(&record))?;
        if !json {
            println!("✓ Exported {} samples to {}", record.len(), path.display());
        }
    }

    match report.outcome {
        SimOutcome::Completed => Ok(()),
        SimOutcome::Aborted { t, reason } => Err(CliError::Aborted { t, reason }),
    }
}

fn print_summary(summary: &RunSummary, wall: f64) {
    match &summary.abort_reason {
        None => println!("✓ Simulation completed at t = {:.6} s", summary.t),
        Some(reason) => println!("✗ Simulation aborted at t = {:.6} s: {}", summary.t, reason),
    }
    println!("  Periods:  {}", summary.periods);
    println!("  Segments: {}", summary.segments);
    println!("  Steps:    {}", summary.steps);
    println!("  Wall:     {:.3} s", wall);
    if !summary.final_state.is_empty() {
        println!("\nFinal state:");
        for (label, value) in &summary.final_state {
            println!("  {:<24} {:>14.6e}", label, value);
        }
    }
}

fn record_csv(record: &SimRecord) -> String {
    let mut csv = String::from("time_s");
    for label in &record.labels {
        csv.push(',');
        csv.push_str(label);
    }
    csv.push_str(",q_a,q_b,q_c\n");
    for ((t, x), q) in record.t.iter().zip(&record.x).zip(&record.q) {
        let _ = write!(csv, "{t}");
        for v in x.iter() {
            let _ = write!(csv, ",{v}");
        }
        let [a, b, c] = q.phases();
        let _ = writeln!(csv, ",{a},{b},{c}");
    }
    csv
}

fn cmd_segments(
    t_s: f64,
    duty: &[f64],
    levels: u32,
    periods: usize,
    falling: bool,
) -> CliResult<()> {
    let [a, b, c] = duty else {
        return Err(CliError::InvalidArg(format!(
            "expected 3 duty ratios, got {}",
            duty.len()
        )));
    };
    if !(t_s.is_finite() && t_s > 0.0) {
        return Err(CliError::InvalidArg(format!("t_s must be positive, got {t_s}")));
    }
    let edge = if falling {
        CarrierEdge::Falling
    } else {
        CarrierEdge::Rising
    };
    let mut pwm = CarrierComparison::new(levels)?.with_initial_edge(edge);

    for k in 0..periods {
        println!("Half period {} ({:?} carrier):", k, pwm.edge());
        for segment in pwm.compare(t_s, [*a, *b, *c]) {
            let [qa, qb, qc] = segment.q.phases();
            println!(
                "  {:>12.6e} s  q = [{}, {}, {}]",
                segment.duration, qa, qb, qc
            );
        }
    }
    Ok(())
}

fn cmd_sweep(config_path: &Path, w_final: Vec<f64>) -> CliResult<()> {
    let config = DriveConfig::load(config_path)?;
    println!("Sweeping {} final frequencies", w_final.len());

    let results = run_sweep(w_final, |w| {
        let mut case = config.clone();
        case.control.w_final = w;
        let summary = case.simulation().map(|mut sim| {
            let report = sim.simulate();
            RunSummary::new(&report, sim.record())
        });
        (w, summary)
    });

    println!("\n{:>12}  {:>10}  {:>14}", "w_final", "status", "final w_m");
    for (w, summary) in results {
        match summary {
            Ok(summary) => {
                let w_m = summary
                    .final_state
                    .iter()
                    .find(|(label, _)| label == "mechanics.w_m")
                    .map(|(_, v)| *v)
                    .unwrap_or(f64::NAN);
                let status = if summary.completed { "ok" } else { "aborted" };
                println!("{:>12.3}  {:>10}  {:>14.6}", w, status, w_m);
            }
            Err(e) => println!("{:>12.3}  {:>10}  {}", w, "invalid", e),
        }
    }
    Ok(())
}
