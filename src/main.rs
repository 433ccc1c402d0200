//! `immtrack` binary: Monte-Carlo evaluation of the CV/CT IMM estimator
//!
//! # Usage
//!
//! ```bash
//! immtrack --bundle data.json
//! immtrack --scenario maneuvering --realizations 100 --steps 150 --seed 7
//! RUST_LOG=debug immtrack --sequential
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use immtrack::bundle::DataBundle;
use immtrack::montecarlo::{run_monte_carlo, AnalysisWindow, MonteCarloOptions};
use immtrack::scenario::{generate_bundle, ScenarioConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Constant velocity throughout
    Straight,
    /// Straight leg, coordinated turn, straight leg
    Maneuvering,
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "immtrack",
    version,
    about = "Interacting Multiple Model (CV/CT) tracker, Monte-Carlo MSE evaluation",
    long_about = None
)]
struct Args {
    /// JSON data bundle to filter. A synthetic scenario is generated when absent.
    #[arg(short, long, value_name = "FILE")]
    bundle: Option<PathBuf>,

    /// Synthetic scenario
    #[arg(long, value_enum, default_value_t = Scenario::Maneuvering)]
    scenario: Scenario,

    /// Number of synthetic realizations
    #[arg(long, default_value_t = 50)]
    realizations: usize,

    /// Number of synthetic time steps
    #[arg(long, default_value_t = 120)]
    steps: usize,

    /// Base seed of the synthetic measurement noise
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Position measurement noise standard deviation of the synthetic scenario
    #[arg(long, value_name = "STD")]
    noise_std: Option<f64>,

    /// First step of the analysis window (default: 10% of the run)
    #[arg(long)]
    window_start: Option<usize>,

    /// End of the analysis window, exclusive (default: run length)
    #[arg(long)]
    window_end: Option<usize>,

    /// Run realizations one after another instead of in parallel
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

fn load_bundle(args: &Args) -> immtrack::Result<DataBundle> {
    if let Some(path) = &args.bundle {
        log::info!("loading bundle from {}", path.display());
        return DataBundle::from_path(path);
    }

    let mut config = match args.scenario {
        Scenario::Straight => ScenarioConfig::straight_line(args.steps, args.realizations, args.seed),
        Scenario::Maneuvering => ScenarioConfig::maneuvering(args.steps, args.realizations, args.seed),
    };
    if let Some(std) = args.noise_std {
        config = config.with_measurement_noise_std(std);
    }
    log::info!("synthesizing {:?} scenario (seed {})", args.scenario, args.seed);
    generate_bundle(&config)
}

fn run(args: &Args) -> immtrack::Result<()> {
    let bundle = load_bundle(args)?;

    let steps = bundle.steps();
    let default_window = AnalysisWindow::trailing(steps);
    let window = AnalysisWindow::new(
        args.window_start.unwrap_or(default_window.start),
        args.window_end.unwrap_or(default_window.end),
    );

    let options = MonteCarloOptions {
        window: Some(window),
        parallel: !args.sequential,
    };

    let report = run_monte_carlo(&bundle, &options)?;
    println!("{}", report);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
