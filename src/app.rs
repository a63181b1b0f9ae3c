use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{SimulationParams, BATCH_RESULTS_FILE_NAME};
use crate::error::{GlauberError, Result};
use crate::output::{read_result, DirectorySink};
use crate::simulation::checkpoint::latest_checkpoint;
use crate::simulation::{LatticeSimulation, RunResult, Strategy, StrategyKind, Topology};

/// Results root used when none is given: `results/<MMDD_HH-MM-SS>`
pub fn default_results_root() -> PathBuf {
    let stamp = chrono::Local::now().format("%m%d_%H-%M-%S").to_string();
    PathBuf::from("results").join(stamp)
}

/// A batch of independent runs over one or more initial densities.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Parameters shared by every run; `p` and `random_seed` are set per run
    pub base: SimulationParams,
    pub probabilities: Vec<f64>,
    pub repetitions: usize,
    pub strategy: StrategyKind,
    pub topology: Topology,
    pub results_root: PathBuf,
    /// Worker threads; `None` uses one per CPU
    pub threads: Option<usize>,
    /// Keep finished runs and warm-start unfinished ones from the newest
    /// checkpoint in their directory
    pub resume: bool,
    pub verbose: bool,
}

impl BatchConfig {
    pub fn new(
        base: SimulationParams,
        probabilities: Vec<f64>,
        repetitions: usize,
        results_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base,
            probabilities,
            repetitions,
            strategy: StrategyKind::Fixed,
            topology: Topology::Bordered,
            results_root: results_root.into(),
            threads: None,
            resume: false,
            verbose: false,
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Every (p, repetition) pair in launch order.
    pub fn tasks(&self) -> Vec<RepetitionTask> {
        let base_seed = self.base.random_seed.unwrap_or(0);
        self.probabilities
            .iter()
            .flat_map(|&p| {
                (0..self.repetitions).map(move |repetition| RepetitionTask {
                    p,
                    repetition,
                    seed: base_seed.wrapping_add(repetition as u64),
                    run_dir: self
                        .results_root
                        .join(format!("p-{p}"))
                        .join(format!("rep-{repetition}")),
                })
            })
            .collect()
    }

    /// Reject the batch before any worker starts.
    pub fn validate(&self) -> Result<()> {
        if self.probabilities.is_empty() {
            return Err(GlauberError::Configuration(
                "at least one probability is needed".to_string(),
            ));
        }
        if self.repetitions == 0 {
            return Err(GlauberError::Configuration(
                "repetitions must be positive".to_string(),
            ));
        }
        for &p in &self.probabilities {
            self.params_for(p, self.base.random_seed.unwrap_or(0))
                .validate(self.topology)?;
        }
        Ok(())
    }

    fn params_for(&self, p: f64, seed: u64) -> SimulationParams {
        let mut params = self.base.clone().with_seed(seed);
        params.p = p;
        if self.topology == Topology::Torus {
            params = params.into_torus();
        }
        params
    }
}

/// One repetition of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct RepetitionTask {
    pub p: f64,
    pub repetition: usize,
    pub seed: u64,
    pub run_dir: PathBuf,
}

impl RepetitionTask {
    /// Build the engine for this repetition and run it to completion.
    pub fn run(&self, config: &BatchConfig) -> Result<RunResult> {
        let params = config
            .params_for(self.p, self.seed)
            .with_results_dir(&self.run_dir);

        let checkpoint = if config.resume {
            if let Some(finished) = read_result(&self.run_dir)? {
                log::info!(
                    "{} already finished after {} iterations, keeping its result",
                    self.run_dir.display(),
                    finished.iterations
                );
                return Ok(finished);
            }
            let found = latest_checkpoint(&self.run_dir)?;
            if found.is_none() {
                log::warn!("No checkpoint in {}, starting fresh", self.run_dir.display());
            }
            found
        } else {
            None
        };

        let sink = DirectorySink::new(&self.run_dir)?;
        let strategy = Strategy::new(config.strategy, config.topology);
        let mut simulation = LatticeSimulation::new(params, strategy, sink)?;
        simulation.run(checkpoint.as_deref(), config.verbose)
    }
}

/// A repetition that returned an error or panicked.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RepetitionFailure {
    pub p: f64,
    pub repetition: usize,
    pub run_dir: PathBuf,
    pub message: String,
}

/// Aggregate over the completed repetitions of one probability.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSummary {
    pub p: f64,
    pub repetitions: usize,
    pub fixations: usize,
    /// `fixations / repetitions`, 0 when nothing completed
    pub fixation_rate: f64,
    pub mean_iterations_when_fix: Option<f64>,
}

impl BatchSummary {
    pub fn from_results<'a>(p: f64, results: impl IntoIterator<Item = &'a RunResult>) -> Self {
        let mut repetitions = 0;
        let mut fixations = 0;
        let mut fixed_iterations = 0usize;

        for result in results {
            repetitions += 1;
            if result.fixation {
                fixations += 1;
                fixed_iterations += result.iterations;
            }
        }

        Self {
            p,
            repetitions,
            fixations,
            fixation_rate: if repetitions == 0 {
                0.0
            } else {
                fixations as f64 / repetitions as f64
            },
            mean_iterations_when_fix: (fixations > 0)
                .then(|| fixed_iterations as f64 / fixations as f64),
        }
    }
}

/// What a batch produced, as written to `batch-results.json`.
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub summaries: Vec<BatchSummary>,
    pub failures: Vec<RepetitionFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn write_json(&self, results_root: &Path) -> Result<PathBuf> {
        fs::create_dir_all(results_root)?;
        let path = results_root.join(BATCH_RESULTS_FILE_NAME);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

/// Run the batch on a rayon pool and write `batch-results.json`.
pub fn run_batch(config: &BatchConfig) -> Result<BatchReport> {
    run_batch_with(config, |task| task.run(config))
}

/// [`run_batch`] with a custom per-repetition runner.
///
/// Each repetition is isolated: an error or panic is recorded as a
/// [`RepetitionFailure`] and its siblings keep running.
pub fn run_batch_with<F>(config: &BatchConfig, runner: F) -> Result<BatchReport>
where
    F: Fn(&RepetitionTask) -> Result<RunResult> + Sync,
{
    config.validate()?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.unwrap_or(0))
        .build()
        .map_err(|e| GlauberError::Configuration(format!("thread pool: {e}")))?;

    let tasks = config.tasks();
    log::info!(
        "Running {} repetitions of {} strategy over p = {:?} on {} threads",
        tasks.len(),
        config.strategy,
        config.probabilities,
        pool.current_num_threads()
    );
    let start = Instant::now();

    let outcomes: Vec<(RepetitionTask, std::result::Result<RunResult, String>)> = pool.install(|| {
        tasks
            .into_par_iter()
            .map(|task| {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| runner(&task))) {
                    Ok(Ok(result)) => {
                        log::info!(
                            "p={} rep={} done: fixation {}, iterations {}",
                            task.p,
                            task.repetition,
                            result.fixation,
                            result.iterations
                        );
                        Ok(result)
                    }
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(payload) => Err(panic_message(payload.as_ref())),
                };
                if let Err(message) = &outcome {
                    log::error!("p={} rep={} failed: {}", task.p, task.repetition, message);
                }
                (task, outcome)
            })
            .collect()
    });

    let mut failures = Vec::new();
    let summaries = config
        .probabilities
        .iter()
        .map(|&p| {
            let completed = outcomes
                .iter()
                .filter(|(task, _)| task.p == p)
                .filter_map(|(_, outcome)| outcome.as_ref().ok());
            BatchSummary::from_results(p, completed)
        })
        .collect();

    for (task, outcome) in outcomes {
        if let Err(message) = outcome {
            failures.push(RepetitionFailure {
                p: task.p,
                repetition: task.repetition,
                run_dir: task.run_dir,
                message,
            });
        }
    }

    let report = BatchReport {
        summaries,
        failures,
    };
    let path = report.write_json(&config.results_root)?;
    log::info!(
        "Batch finished in {:.2?}, summary written to {}",
        start.elapsed(),
        path.display()
    );
    Ok(report)
}
