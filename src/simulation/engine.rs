use std::path::Path;

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::cell::Topology;
use super::checkpoint::parse_checkpoint_index;
use super::grid::{interior_mask, BitMatrix, IndexMode};
use super::rule::{glauber_value, neighbor_sum};
use super::strategy::IndexingStrategy;
use super::SimRng;
use crate::config::{LatticeDims, SimulationParams, LOGGING_STEP};
use crate::error::{GlauberError, Result};
use crate::output::OutputSink;

/// Why the step loop ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Interior share of ones reached `tol`
    FixedAtOnes,
    /// Interior share of ones fell to `1 - tol`
    FixedAtZeros,
    /// Planned horizon reached without fixation
    #[default]
    Horizon,
    /// The strategy ran out of candidate vertices
    Exhausted,
}

/// Result record of one run, as written to `result-dict.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub fixation: bool,
    /// Step at which the loop stopped, or the horizon if it ran out
    pub iterations: usize,
    /// Interior share of ones per step, `-1.0` where no step ran
    pub vector: Vec<f64>,
    #[serde(skip)]
    pub stop: StopReason,
}

impl RunResult {
    /// Stop reason implied by the persisted fields, for results read back
    /// from disk.
    pub fn recorded_stop(&self) -> StopReason {
        if self.fixation {
            StopReason::FixedAtOnes
        } else if self.iterations >= self.vector.len() {
            StopReason::Horizon
        } else if self.vector[self.iterations] >= 0.0 {
            StopReason::FixedAtZeros
        } else {
            StopReason::Exhausted
        }
    }
}

/// Two-sided fixation test on exact interior counts.
///
/// The upper threshold wins if both hold, which needs `tol <= 0.5`.
pub fn fixation_check(ones: usize, target: usize, tol: f64) -> Option<StopReason> {
    let (ones, target) = (ones as f64, target as f64);
    if ones >= tol * target {
        Some(StopReason::FixedAtOnes)
    } else if ones <= (1.0 - tol) * target {
        Some(StopReason::FixedAtZeros)
    } else {
        None
    }
}

/// Glauber dynamics on one lattice, driven by an indexing strategy.
///
/// The engine owns its RNG, so a run is reproducible from the seed alone.
/// Lattice and mask only live for the duration of [`LatticeSimulation::run`];
/// the same engine can be run again.
pub struct LatticeSimulation<S, O> {
    params: SimulationParams,
    dims: LatticeDims,
    topology: Topology,
    strategy: S,
    sink: O,
    rng: SimRng,
}

impl<S: IndexingStrategy, O: OutputSink> LatticeSimulation<S, O> {
    /// Engine seeded from `params.random_seed`, or the process id if unset.
    pub fn new(params: SimulationParams, strategy: S, sink: O) -> Result<Self> {
        let seed = match params.random_seed {
            Some(seed) => seed,
            None => u64::from(std::process::id()),
        };
        log::info!("Random seed set to {}", seed);
        Self::with_rng(params, strategy, sink, SimRng::seed_from_u64(seed))
    }

    /// Engine drawing from an explicitly supplied RNG.
    pub fn with_rng(
        mut params: SimulationParams,
        strategy: S,
        mut sink: O,
        rng: SimRng,
    ) -> Result<Self> {
        let topology = strategy.topology();
        if topology == Topology::Torus {
            params = params.into_torus();
        }

        let dims = params.validate(topology)?;
        params.padding = Some(dims.padding);
        params.n_outer = None;

        sink.write_params(&params, &dims)?;
        log::info!(
            "Initializing {} with n_interior={} padding={} n_outer={} p={} t={} tol={}",
            strategy.name(),
            dims.n_interior,
            dims.padding,
            dims.n_outer,
            params.p,
            params.t,
            params.tol
        );

        Ok(Self {
            params,
            dims,
            topology,
            strategy,
            sink,
            rng,
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn dims(&self) -> LatticeDims {
        self.dims
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    pub fn into_sink(self) -> O {
        self.sink
    }

    /// Fresh lattice: Bernoulli(p) cells, then the boundary policy.
    fn setup_matrix(&mut self) -> BitMatrix {
        let mut lattice = BitMatrix::random(self.dims.n_outer, self.params.p, &mut self.rng);

        match (self.topology, self.params.boundary.fixed_value()) {
            (Topology::Torus, _) => lattice.set_index_mode(IndexMode::Wraparound),
            (Topology::Bordered, Some(bit)) => {
                lattice.fill_border(bit);
                log::info!("Set up boundary as {}", self.params.boundary);
            }
            (Topology::Bordered, None) => log::info!("Setting up random boundary"),
        }
        lattice
    }

    /// Load `path` over `lattice` and return the first iteration still to run.
    ///
    /// A missing file is not fatal: the run starts over on the lattice
    /// that was already sampled.
    fn restore_checkpoint(&mut self, path: &Path, lattice: &mut BitMatrix) -> Result<usize> {
        log::info!("Loading checkpoint matrix from {}", path.display());
        let mut restored =
            BitMatrix::new(self.dims.n_outer, self.dims.n_outer).with_index_mode(lattice.index_mode());

        match restored.load(path) {
            Ok(()) => {
                let last_index = parse_checkpoint_index(path)?;
                log::info!("Last completed index: {}", last_index);
                *lattice = restored;
                Ok(last_index + 1)
            }
            Err(GlauberError::CheckpointNotFound(missing)) => {
                log::error!(
                    "Checkpoint file {} not found, starting from scratch",
                    missing.display()
                );
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Run to fixation, exhaustion or the horizon, optionally resuming from
    /// a checkpoint bitmap.
    pub fn run(&mut self, checkpoint: Option<&Path>, verbose: bool) -> Result<RunResult> {
        log::info!("Simulation running in process {}", std::process::id());

        let mut lattice = self.setup_matrix();
        let interior = interior_mask(self.dims.n_outer, self.dims.padding);
        log::debug!("Padding: {}, target: {}", self.dims.padding, self.dims.target());

        let resume = match checkpoint {
            Some(path) => self.restore_checkpoint(path, &mut lattice)?,
            None => 0,
        };

        self.strategy.setup(&lattice, self.params.t, &mut self.rng);
        log::info!("Starting Glauber simulation at index {}", resume);

        let mut vector = vec![-1.0; self.params.t];
        let looped = self.step_loop(&mut lattice, &interior, resume, &mut vector, verbose);

        // The strategy is released whatever happened in the loop
        let persisted = looped.and_then(|(stop, iterations)| {
            let result = RunResult {
                fixation: stop == StopReason::FixedAtOnes,
                iterations,
                vector,
                stop,
            };
            self.sink.write_checkpoint(iterations, &lattice)?;
            self.sink.write_result(&result)?;
            Ok(result)
        });
        self.strategy.reset();

        let result = persisted?;
        log::info!(
            "Result: fixation: {}, iterations: {} ({:?})",
            result.fixation,
            result.iterations,
            result.stop
        );
        Ok(result)
    }

    fn step_loop(
        &mut self,
        lattice: &mut BitMatrix,
        interior: &BitMatrix,
        resume: usize,
        vector: &mut [f64],
        verbose: bool,
    ) -> Result<(StopReason, usize)> {
        let target = self.dims.target();
        let mut ones = lattice.count_ones_masked(interior);

        for i in resume..self.params.t {
            let Some(coord) = self.strategy.next_index(i, &mut self.rng) else {
                log::info!("No more indices available at iteration {}, stopping", i);
                return Ok((StopReason::Exhausted, i));
            };
            let (row, col) = (coord.row as isize, coord.col as isize);

            let sum = neighbor_sum(lattice, coord);
            let old = lattice.get(row, col);
            let rng = &mut self.rng;
            let new = glauber_value(sum, || rng.gen_bool(0.5));
            let changed = new != old;

            if changed {
                if log::log_enabled!(log::Level::Trace) {
                    log::trace!(
                        "Setting {} to {} (neighbour sum {}):\n{}",
                        coord,
                        new as u8,
                        sum,
                        lattice.debug_string(coord.row, coord.col)
                    );
                }
                lattice.set(row, col, new);
                if interior.get(row, col) {
                    if new {
                        ones += 1;
                    } else {
                        ones -= 1;
                    }
                }
            }
            self.strategy.on_update(lattice, coord, changed);

            vector[i] = ones as f64 / target as f64;

            if let Some(every) = self.params.save_bitmaps_every {
                if i % every == 0 {
                    self.sink.write_checkpoint(i, lattice)?;
                }
            }

            if let Some(stop) = fixation_check(ones, target, self.params.tol) {
                log::info!(
                    "Fixation ({:?}) at iteration {}. Share of ones is {}",
                    stop,
                    i,
                    vector[i]
                );
                log::debug!("Matrix at fixation:\n{}", lattice);
                return Ok((stop, i));
            }

            if verbose && i % LOGGING_STEP == 0 {
                log::info!("Iteration {}: share of ones is {}", i, vector[i]);
                if let Some(remaining) = self.strategy.remaining() {
                    log::info!("Number of vertices available for update: {}", remaining);
                }
            }
        }

        Ok((StopReason::Horizon, self.params.t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Boundary, BITMAP_DIR_NAME};
    use crate::output::{DirectorySink, MemorySink};
    use crate::simulation::cell::Coord;
    use crate::simulation::rule::can_flip;
    use crate::simulation::strategy::{DynamicActiveSet, FixedStream, Strategy, StrategyKind};

    fn scenario_params() -> SimulationParams {
        SimulationParams::new(5, 0.7, 200, 0.98)
            .with_padding(1)
            .with_seed(0)
            .with_boundary(Boundary::Ones)
    }

    fn run_memory<S: IndexingStrategy>(params: SimulationParams, strategy: S) -> RunResult {
        let mut sim = LatticeSimulation::new(params, strategy, MemorySink::new()).unwrap();
        sim.run(None, false).unwrap()
    }

    /// Properties every finished trace has, whatever the outcome.
    fn assert_trace_shape(result: &RunResult, n_interior: usize, tol: f64, t: usize) {
        let target = n_interior * n_interior;
        assert_eq!(result.vector.len(), t);

        let last_written = match result.stop {
            StopReason::Horizon => t,
            StopReason::Exhausted => result.iterations,
            StopReason::FixedAtOnes | StopReason::FixedAtZeros => result.iterations + 1,
        };
        for (i, &share) in result.vector.iter().enumerate() {
            if i >= last_written {
                assert_eq!(share, -1.0, "index {i} past the stop should be unwritten");
                continue;
            }
            let count = (share * target as f64).round();
            assert!((share * target as f64 - count).abs() < 1e-9);
            let check = fixation_check(count as usize, target, tol);
            let fixed = matches!(result.stop, StopReason::FixedAtOnes | StopReason::FixedAtZeros);
            if fixed && i == result.iterations {
                assert_eq!(check, Some(result.stop));
            } else {
                assert_eq!(check, None, "loop should have stopped at {i}");
            }
        }
        assert_eq!(result.fixation, result.stop == StopReason::FixedAtOnes);
    }

    /// Checks the Glauber rule after every update and tallies tie outcomes.
    struct RuleChecker<S> {
        inner: S,
        tie_outcomes: [usize; 2],
    }

    impl<S: IndexingStrategy> IndexingStrategy for RuleChecker<S> {
        fn name(&self) -> &'static str {
            self.inner.name()
        }
        fn topology(&self) -> Topology {
            self.inner.topology()
        }
        fn setup(&mut self, lattice: &BitMatrix, horizon: usize, rng: &mut SimRng) {
            self.inner.setup(lattice, horizon, rng)
        }
        fn next_index(&mut self, step: usize, rng: &mut SimRng) -> Option<Coord> {
            self.inner.next_index(step, rng)
        }
        fn on_update(&mut self, lattice: &BitMatrix, coord: Coord, changed: bool) {
            let value = lattice.get(coord.row as isize, coord.col as isize);
            match neighbor_sum(lattice, coord) {
                0 | 1 => assert!(!value),
                2 => self.tie_outcomes[value as usize] += 1,
                _ => assert!(value),
            }
            self.inner.on_update(lattice, coord, changed)
        }
        fn remaining(&self) -> Option<usize> {
            self.inner.remaining()
        }
        fn reset(&mut self) {
            self.inner.reset()
        }
    }

    /// Asserts after every update that no flippable vertex is missing.
    struct ActiveSetAuditor {
        inner: DynamicActiveSet,
        audits: usize,
    }

    impl IndexingStrategy for ActiveSetAuditor {
        fn name(&self) -> &'static str {
            self.inner.name()
        }
        fn topology(&self) -> Topology {
            self.inner.topology()
        }
        fn setup(&mut self, lattice: &BitMatrix, horizon: usize, rng: &mut SimRng) {
            self.inner.setup(lattice, horizon, rng)
        }
        fn next_index(&mut self, step: usize, rng: &mut SimRng) -> Option<Coord> {
            self.inner.next_index(step, rng)
        }
        fn on_update(&mut self, lattice: &BitMatrix, coord: Coord, changed: bool) {
            self.inner.on_update(lattice, coord, changed);
            let (n, _) = lattice.shape();
            for row in 0..n {
                for col in 0..n {
                    let c = Coord::new(row, col);
                    if c.is_updatable(n, self.topology()) && can_flip(lattice, c) {
                        assert!(self.inner.contains(c), "{c} can flip but is not active");
                    }
                }
            }
            self.audits += 1;
        }
        fn remaining(&self) -> Option<usize> {
            self.inner.remaining()
        }
        fn reset(&mut self) {
            self.inner.reset()
        }
    }

    #[test]
    fn test_recorded_stop_matches_run() {
        let cases = [
            (SimulationParams::new(5, 0.7, 200, 0.98), Boundary::Ones, StrategyKind::Fixed),
            (SimulationParams::new(5, 0.0, 100, 0.9), Boundary::Zeros, StrategyKind::Fixed),
            (SimulationParams::new(6, 1.0, 50, 0.99), Boundary::Ones, StrategyKind::Dynamic),
            (SimulationParams::new(40, 0.5, 100, 0.99), Boundary::Ones, StrategyKind::Fixed),
        ];
        for (params, boundary, kind) in cases {
            let params = params.with_padding(1).with_seed(0).with_boundary(boundary);
            let result = run_memory(params, Strategy::new(kind, Topology::Bordered));
            let reread: RunResult =
                serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
            assert_eq!(reread.recorded_stop(), result.stop);
        }
    }

    /// Dynamic strategy that logs each pick with the size of the set it
    /// was drawn from, and each tie outcome.
    struct PickRecorder {
        inner: DynamicActiveSet,
        picks: Vec<(Coord, usize)>,
        ties: Vec<bool>,
    }

    impl IndexingStrategy for PickRecorder {
        fn name(&self) -> &'static str {
            self.inner.name()
        }
        fn topology(&self) -> Topology {
            self.inner.topology()
        }
        fn setup(&mut self, lattice: &BitMatrix, horizon: usize, rng: &mut SimRng) {
            self.inner.setup(lattice, horizon, rng)
        }
        fn next_index(&mut self, step: usize, rng: &mut SimRng) -> Option<Coord> {
            let pool = self.inner.len();
            let coord = self.inner.next_index(step, rng)?;
            self.picks.push((coord, pool));
            Some(coord)
        }
        fn on_update(&mut self, lattice: &BitMatrix, coord: Coord, changed: bool) {
            if neighbor_sum(lattice, coord) == 2 {
                self.ties.push(lattice.get(coord.row as isize, coord.col as isize));
            }
            self.inner.on_update(lattice, coord, changed)
        }
        fn remaining(&self) -> Option<usize> {
            self.inner.remaining()
        }
        fn reset(&mut self) {
            self.inner.reset()
        }
    }

    /// Fixed stream over recorded picks that spends the same draws as the
    /// dynamic set did, so tie coins land identically.
    struct PickReplayer {
        inner: FixedStream,
        pools: Vec<usize>,
        ties: Vec<bool>,
    }

    impl IndexingStrategy for PickReplayer {
        fn name(&self) -> &'static str {
            self.inner.name()
        }
        fn topology(&self) -> Topology {
            self.inner.topology()
        }
        fn setup(&mut self, lattice: &BitMatrix, horizon: usize, rng: &mut SimRng) {
            self.inner.setup(lattice, horizon, rng)
        }
        fn next_index(&mut self, step: usize, rng: &mut SimRng) -> Option<Coord> {
            let coord = self.inner.next_index(step, rng)?;
            let _ = rng.gen_range(0..self.pools[step]);
            Some(coord)
        }
        fn on_update(&mut self, lattice: &BitMatrix, coord: Coord, _changed: bool) {
            if neighbor_sum(lattice, coord) == 2 {
                self.ties.push(lattice.get(coord.row as isize, coord.col as isize));
            }
        }
        fn remaining(&self) -> Option<usize> {
            self.inner.remaining()
        }
        fn reset(&mut self) {
            self.inner.reset()
        }
    }

    #[test]
    fn test_dynamic_matches_fixed_replay() {
        for (seed, topology) in [(1, Topology::Bordered), (6, Topology::Bordered), (2, Topology::Torus)] {
            let params = SimulationParams::new(12, 0.5, 2_000, 0.95)
                .with_padding(1)
                .with_seed(seed);

            let recorder = PickRecorder {
                inner: DynamicActiveSet::new(topology),
                picks: Vec::new(),
                ties: Vec::new(),
            };
            let mut dynamic =
                LatticeSimulation::new(params.clone(), recorder, MemorySink::new()).unwrap();
            let expected = dynamic.run(None, false).unwrap();
            let recorded = dynamic.strategy();
            assert!(!recorded.picks.is_empty());

            let replayer = PickReplayer {
                inner: FixedStream::from_coords(topology, recorded.picks.iter().map(|&(c, _)| c)),
                pools: recorded.picks.iter().map(|&(_, pool)| pool).collect(),
                ties: Vec::new(),
            };
            let mut fixed = LatticeSimulation::new(params, replayer, MemorySink::new()).unwrap();
            let replayed = fixed.run(None, false).unwrap();

            assert_eq!(fixed.strategy().ties, dynamic.strategy().ties);
            assert_eq!(replayed, expected, "seed {seed} on {topology:?}");
            assert_eq!(
                fixed.sink().last_checkpoint(),
                dynamic.sink().last_checkpoint(),
                "final lattices differ for seed {seed} on {topology:?}"
            );
        }
    }

    #[test]
    fn test_fixation_check_thresholds() {
        assert_eq!(fixation_check(25, 25, 0.98), Some(StopReason::FixedAtOnes));
        assert_eq!(fixation_check(24, 25, 0.98), None);
        assert_eq!(fixation_check(0, 25, 0.98), Some(StopReason::FixedAtZeros));
        assert_eq!(fixation_check(1, 25, 0.98), None);
        assert_eq!(fixation_check(17, 20, 0.85), Some(StopReason::FixedAtOnes));
        assert_eq!(fixation_check(3, 20, 0.85), Some(StopReason::FixedAtZeros));
    }

    #[test]
    fn test_fixation_exclusive_above_half() {
        for tol in [0.51, 0.6, 0.85, 0.98, 1.0] {
            for target in [1usize, 4, 25, 100] {
                for ones in 0..=target {
                    let (ones_f, target_f) = (ones as f64, target as f64);
                    let upper = ones_f >= tol * target_f;
                    let lower = ones_f <= (1.0 - tol) * target_f;
                    assert!(!(upper && lower), "tol {tol}, {ones}/{target}");
                }
            }
        }
    }

    #[test]
    fn test_scenario_fixed_stream() {
        let params = scenario_params();
        let result = run_memory(params, FixedStream::new(Topology::Bordered));
        assert_trace_shape(&result, 5, 0.98, 200);
        assert!(result.vector[0] >= 0.0);
    }

    #[test]
    fn test_scenario_dynamic() {
        let params = scenario_params();
        let result = run_memory(params, DynamicActiveSet::new(Topology::Bordered));
        assert_trace_shape(&result, 5, 0.98, 200);
    }

    #[test]
    fn test_determinism() {
        for kind in [StrategyKind::Fixed, StrategyKind::Dynamic] {
            for topology in [Topology::Bordered, Topology::Torus] {
                let params = SimulationParams::new(30, 0.52, 3_000, 0.9)
                    .with_padding(3)
                    .with_seed(17);
                let a = run_memory(params.clone(), Strategy::new(kind, topology));
                let b = run_memory(params, Strategy::new(kind, topology));
                assert_eq!(a, b, "{kind} on {topology:?} is not reproducible");
                assert_trace_shape(&a, 30, 0.9, 3_000);
            }
        }
    }

    #[test]
    fn test_seeds_give_different_runs() {
        let base = SimulationParams::new(30, 0.5, 500, 0.9).with_padding(2);
        let a = run_memory(base.clone().with_seed(1), FixedStream::new(Topology::Bordered));
        let b = run_memory(base.with_seed(2), FixedStream::new(Topology::Bordered));
        assert_ne!(a.vector, b.vector);
    }

    #[test]
    fn test_update_rule_holds() {
        let mut ties = [0usize; 2];
        for seed in 0..8 {
            for kind in [StrategyKind::Fixed, StrategyKind::Dynamic] {
                let params = SimulationParams::new(16, 0.5, 2_000, 0.99)
                    .with_padding(1)
                    .with_seed(seed);
                let checker = RuleChecker {
                    inner: Strategy::new(kind, Topology::Bordered),
                    tie_outcomes: [0; 2],
                };
                let mut sim = LatticeSimulation::new(params, checker, MemorySink::new()).unwrap();
                sim.run(None, false).unwrap();
                ties[0] += sim.strategy().tie_outcomes[0];
                ties[1] += sim.strategy().tie_outcomes[1];
            }
        }
        assert!(ties[0] > 0 && ties[1] > 0, "tie outcomes {ties:?}");
    }

    #[test]
    fn test_active_set_covers_flippable_vertices() {
        for topology in [Topology::Bordered, Topology::Torus] {
            let params = SimulationParams::new(10, 0.5, 400, 0.99)
                .with_padding(1)
                .with_seed(4);
            let auditor = ActiveSetAuditor {
                inner: DynamicActiveSet::new(topology),
                audits: 0,
            };
            let mut sim = LatticeSimulation::new(params, auditor, MemorySink::new()).unwrap();
            let result = sim.run(None, false).unwrap();
            assert!(sim.strategy().audits > 0);
            assert_trace_shape(&result, 10, 0.99, 400);
        }
    }

    #[test]
    fn test_exhaustion_terminates_immediately() {
        let params = SimulationParams::new(6, 1.0, 50, 0.99)
            .with_padding(1)
            .with_seed(0)
            .with_boundary(Boundary::Ones);
        let result = run_memory(params, DynamicActiveSet::new(Topology::Bordered));
        assert_eq!(result.stop, StopReason::Exhausted);
        assert!(!result.fixation);
        assert_eq!(result.iterations, 0);
        assert!(result.vector.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_horizon_without_fixation() {
        let params = SimulationParams::new(40, 0.5, 100, 0.99)
            .with_padding(1)
            .with_seed(3);
        let result = run_memory(params, FixedStream::new(Topology::Bordered));
        assert_eq!(result.stop, StopReason::Horizon);
        assert_eq!(result.iterations, 100);
        assert!(!result.fixation);
        assert!(result.vector.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_lower_fixation_reports_false() {
        let params = SimulationParams::new(5, 0.0, 100, 0.9)
            .with_padding(1)
            .with_seed(0)
            .with_boundary(Boundary::Zeros);
        let result = run_memory(params, FixedStream::new(Topology::Bordered));
        assert_eq!(result.stop, StopReason::FixedAtZeros);
        assert_eq!(result.iterations, 0);
        assert!(!result.fixation);
        assert_eq!(result.vector[0], 0.0);
        assert_eq!(result.vector[1], -1.0);
    }

    #[test]
    fn test_torus_forces_parameters() {
        let params = SimulationParams::new(12, 0.5, 10, 0.9)
            .with_padding(4)
            .with_seed(0)
            .with_boundary(Boundary::Ones);
        let sim =
            LatticeSimulation::new(params, FixedStream::new(Topology::Torus), MemorySink::new())
                .unwrap();
        assert_eq!(sim.dims().n_outer, 12);
        assert_eq!(sim.params().boundary, Boundary::Random);
        assert_eq!(sim.sink().params.as_ref().unwrap().padding, Some(0));
    }

    #[test]
    fn test_missing_sizes_fail_construction() {
        let params = SimulationParams::new(5, 0.5, 10, 0.9);
        let built =
            LatticeSimulation::new(params, FixedStream::new(Topology::Bordered), MemorySink::new());
        assert!(matches!(built, Err(GlauberError::Configuration(_))));
    }

    #[test]
    fn test_checkpoints_every_interval_and_final() {
        let params = SimulationParams::new(20, 0.5, 35, 0.99)
            .with_padding(2)
            .with_seed(9)
            .with_checkpoint_every(Some(10));
        let mut sim =
            LatticeSimulation::new(params, FixedStream::new(Topology::Bordered), MemorySink::new())
                .unwrap();
        sim.run(None, false).unwrap();
        let sink = sim.into_sink();
        assert_eq!(sink.checkpoints.keys().copied().collect::<Vec<_>>(), vec![0, 10, 20, 30, 35]);
        assert_eq!(sink.results.len(), 1);
        assert_eq!(sink.checkpoints[&0].len(), (24 * 24usize).div_ceil(8));
    }

    #[test]
    fn test_final_checkpoint_matches_trace() {
        let params = SimulationParams::new(12, 0.55, 300, 0.95)
            .with_padding(2)
            .with_seed(21);
        let mut sim = LatticeSimulation::new(
            params,
            DynamicActiveSet::new(Topology::Bordered),
            MemorySink::new(),
        )
        .unwrap();
        let result = sim.run(None, false).unwrap();
        let sink = sim.into_sink();
        let (iteration, bytes) = sink.last_checkpoint().unwrap();
        assert_eq!(iteration, result.iterations);

        let lattice = BitMatrix::from_bits(
            16,
            16,
            (0..256).map(|k| (bytes[k / 8] >> (7 - k % 8)) & 1 == 1),
        );
        let ones = lattice.count_ones_masked(&interior_mask(16, 2));
        let last = result.vector.iter().rev().find(|&&v| v >= 0.0).copied();
        if let Some(share) = last {
            assert_eq!(ones as f64 / 144.0, share);
        }
    }

    #[test]
    fn test_resume_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let params = SimulationParams::new(20, 0.5, 50, 0.99)
            .with_padding(2)
            .with_seed(5)
            .with_checkpoint_every(Some(10));

        let first_dir = dir.path().join("first");
        let mut first = LatticeSimulation::new(
            params.clone(),
            FixedStream::new(Topology::Bordered),
            DirectorySink::new(&first_dir).unwrap(),
        )
        .unwrap();
        let full = first.run(None, false).unwrap();
        assert_eq!(full.stop, StopReason::Horizon);

        let checkpoint = first_dir.join(BITMAP_DIR_NAME).join("iter-20.bmp");
        let mut resumed = LatticeSimulation::new(
            params,
            FixedStream::new(Topology::Bordered),
            DirectorySink::new(dir.path().join("resumed")).unwrap(),
        )
        .unwrap();
        let result = resumed.run(Some(&checkpoint), false).unwrap();

        assert!(result.vector[..=20].iter().all(|&v| v == -1.0));
        assert!(result.vector[21..].iter().all(|&v| v >= 0.0));
        // Step 21 starts from the lattice saved at step 20 and moves one cell at most
        assert!((result.vector[21] - full.vector[20]).abs() <= 1.0 / 400.0 + 1e-12);
        assert_eq!(result.iterations, 50);
    }

    #[test]
    fn test_checkpoint_beyond_horizon_keeps_lattice() {
        let dir = tempfile::tempdir().unwrap();
        let bitmap = dir.path().join("iter-40.bmp");
        let mut saved = BitMatrix::random(9, 0.5, &mut SimRng::seed_from_u64(2));
        saved.fill_border(true);
        saved.export(&bitmap).unwrap();

        let params = SimulationParams::new(7, 0.5, 20, 0.99)
            .with_padding(1)
            .with_seed(0);
        let mut sim =
            LatticeSimulation::new(params, FixedStream::new(Topology::Bordered), MemorySink::new())
                .unwrap();
        let result = sim.run(Some(&bitmap), false).unwrap();
        assert_eq!(result.stop, StopReason::Horizon);
        assert_eq!(result.iterations, 20);

        let sink = sim.into_sink();
        assert_eq!(sink.checkpoints[&20], saved.as_bytes());
    }

    #[test]
    fn test_missing_checkpoint_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let params = SimulationParams::new(15, 0.6, 500, 0.95)
            .with_padding(1)
            .with_seed(8);

        let fresh = run_memory(params.clone(), FixedStream::new(Topology::Bordered));

        let mut sim =
            LatticeSimulation::new(params, FixedStream::new(Topology::Bordered), MemorySink::new())
                .unwrap();
        let missing = dir.path().join("iter-100.bmp");
        let fallback = sim.run(Some(&missing), false).unwrap();
        assert_eq!(fallback, fresh);
    }

    #[test]
    fn test_malformed_checkpoint_name_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let bitmap = dir.path().join("latest.bmp");
        BitMatrix::new(7, 7).export(&bitmap).unwrap();

        let params = SimulationParams::new(5, 0.5, 20, 0.99)
            .with_padding(1)
            .with_seed(0);
        let mut sim =
            LatticeSimulation::new(params, FixedStream::new(Topology::Bordered), MemorySink::new())
                .unwrap();
        assert!(matches!(
            sim.run(Some(&bitmap), false),
            Err(GlauberError::MalformedCheckpointName { .. })
        ));
    }

    #[test]
    fn test_engine_is_reusable() {
        let params = SimulationParams::new(10, 0.5, 200, 0.95)
            .with_padding(1)
            .with_seed(12);
        let mut sim = LatticeSimulation::new(
            params,
            DynamicActiveSet::new(Topology::Bordered),
            MemorySink::new(),
        )
        .unwrap();
        let first = sim.run(None, false).unwrap();
        assert!(sim.strategy().is_empty());
        let second = sim.run(None, true).unwrap();
        assert_eq!(second.vector.len(), first.vector.len());
        assert_eq!(sim.sink().results.len(), 2);
    }

    #[test]
    #[ignore = "large lattice, run with --release --ignored"]
    fn test_large_run_fixates() {
        let params = SimulationParams::new(1000, 0.98, 200_000, 0.982)
            .with_padding(100)
            .with_seed(0);
        let result = run_memory(params, FixedStream::new(Topology::Bordered));
        assert!(result.fixation);
        assert!(
            (140_000..200_000).contains(&result.iterations),
            "fixed at {}",
            result.iterations
        );
    }
}
