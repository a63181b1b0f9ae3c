//! Glauber fixation batch runner
//!
//! ```bash
//! # 8 repetitions of a 200x200 interior at two densities, dynamic indices
//! glauber --n-interior 200 --padding 20 --p 0.55 --p 0.6 --t 2000000 --reps 8 --dynamic
//!
//! # Same parameters from a file, continuing interrupted runs
//! glauber --params simulation-params.json --results-dir results/run-a --resume
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use glauber_fixation::app::{default_results_root, run_batch, BatchConfig};
use glauber_fixation::config::{Boundary, SimulationParams, DEFAULT_TOL};
use glauber_fixation::error::{GlauberError, Result};
use glauber_fixation::simulation::{StrategyKind, Topology};

/// Glauber dynamics fixation experiments on square lattices.
///
/// Flags override the values read from `--params`.
#[derive(Parser, Debug)]
#[command(name = "glauber")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Side of the interior square used for the fixation test
    #[arg(long)]
    n_interior: Option<usize>,

    /// Width of the padding ring around the interior
    #[arg(long)]
    padding: Option<usize>,

    /// Initial density of ones; repeat for a sweep
    #[arg(long)]
    p: Vec<f64>,

    /// Planned number of vertex updates per run
    #[arg(long)]
    t: Option<usize>,

    /// Interior share of ones (or zeros) that counts as fixation
    #[arg(long)]
    tol: Option<f64>,

    /// Repetitions per density
    #[arg(long, default_value = "1")]
    reps: usize,

    /// Save the lattice every N iterations
    #[arg(long)]
    checkpoint_every: Option<usize>,

    /// Border policy: 0, 1 or random
    #[arg(long)]
    boundary: Option<Boundary>,

    /// Pick updates from the set of vertices that can still flip
    #[arg(long)]
    dynamic: bool,

    /// Wrap the lattice into a torus (no padding, random boundary)
    #[arg(long)]
    torus: bool,

    /// Base seed; repetition i runs with seed + i
    #[arg(long)]
    seed: Option<u64>,

    /// Batch root directory. Defaults to results/<timestamp>
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Continue each run from its newest checkpoint
    #[arg(long)]
    resume: bool,

    /// Worker threads, one per CPU when omitted
    #[arg(long)]
    threads: Option<usize>,

    /// Parameter file in the simulation-params.json format
    #[arg(long)]
    params: Option<PathBuf>,

    /// Log progress every 100000 iterations
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_batch_config(self) -> Result<BatchConfig> {
        let mut base = match &self.params {
            Some(path) => SimulationParams::from_json_file(path)?,
            None => {
                let missing = |flag: &str| {
                    GlauberError::Configuration(format!("--{flag} is required without --params"))
                };
                let n_interior = self.n_interior.ok_or_else(|| missing("n-interior"))?;
                let t = self.t.ok_or_else(|| missing("t"))?;
                let p = self.p.first().copied().ok_or_else(|| missing("p"))?;
                SimulationParams::new(n_interior, p, t, DEFAULT_TOL)
            }
        };

        if let Some(n_interior) = self.n_interior {
            base.n_interior = n_interior;
        }
        if let Some(padding) = self.padding {
            base.padding = Some(padding);
            base.n_outer = None;
        }
        if let Some(t) = self.t {
            base.t = t;
        }
        if let Some(tol) = self.tol {
            base.tol = tol;
        }
        if let Some(every) = self.checkpoint_every {
            base.save_bitmaps_every = Some(every);
        }
        if let Some(boundary) = self.boundary {
            base.boundary = boundary;
        }
        if let Some(seed) = self.seed {
            base.random_seed = Some(seed);
        }

        let probabilities = if self.p.is_empty() {
            vec![base.p]
        } else {
            self.p
        };
        let results_root = self
            .results_dir
            .or_else(|| base.results_dir.clone())
            .unwrap_or_else(default_results_root);

        let strategy = if self.dynamic {
            StrategyKind::Dynamic
        } else {
            StrategyKind::Fixed
        };
        let topology = if self.torus {
            Topology::Torus
        } else {
            Topology::Bordered
        };

        Ok(BatchConfig::new(base, probabilities, self.reps, results_root)
            .with_strategy(strategy)
            .with_topology(topology)
            .with_threads(self.threads)
            .with_resume(self.resume)
            .with_verbose(self.verbose))
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Cli::parse().into_batch_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(2);
        }
    };

    match run_batch(&config) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            log::error!(
                "{} repetitions failed, see {}",
                report.failures.len(),
                config.results_root.display()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("Batch aborted: {}", e);
            ExitCode::from(2)
        }
    }
}
