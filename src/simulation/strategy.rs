use std::fmt;
use std::str::FromStr;

use rand::Rng;

use super::active_set::ActiveVertexSet;
use super::cell::{Coord, Topology};
use super::grid::BitMatrix;
use super::rule::can_flip;
use super::SimRng;
use crate::error::{GlauberError, Result};

/// Source of the vertices the step loop updates.
pub trait IndexingStrategy {
    fn name(&self) -> &'static str;

    fn topology(&self) -> Topology;

    /// Prepare for a run over `lattice` with a planned horizon of `horizon` steps.
    fn setup(&mut self, lattice: &BitMatrix, horizon: usize, rng: &mut SimRng);

    /// Vertex to update at `step`, or `None` once the strategy is exhausted.
    fn next_index(&mut self, step: usize, rng: &mut SimRng) -> Option<Coord>;

    /// Called after `coord` was updated; `changed` tells whether its value flipped.
    fn on_update(&mut self, lattice: &BitMatrix, coord: Coord, changed: bool);

    /// Candidates left, for strategies that track them
    fn remaining(&self) -> Option<usize>;

    /// Drop run-scoped state so the strategy can serve another run.
    fn reset(&mut self);
}

/// Rows (and columns) a strategy may pick
fn updatable_range(n_outer: usize, topology: Topology) -> std::ops::Range<usize> {
    match topology {
        Topology::Torus => 0..n_outer,
        Topology::Bordered => 1..n_outer.saturating_sub(1),
    }
}

// ============================================
// Fixed, pre-sampled stream
// ============================================

/// `t` vertices drawn uniformly with replacement at setup, visited in order.
#[derive(Clone, Debug)]
pub struct FixedStream {
    topology: Topology,
    coords: Vec<[u32; 2]>,
    replay: bool,
}

impl FixedStream {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            coords: Vec::new(),
            replay: false,
        }
    }

    /// Stream that replays `coords` instead of sampling its own
    pub fn from_coords(topology: Topology, coords: impl IntoIterator<Item = Coord>) -> Self {
        Self {
            topology,
            coords: coords
                .into_iter()
                .map(|c| [c.row as u32, c.col as u32])
                .collect(),
            replay: true,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

impl IndexingStrategy for FixedStream {
    fn name(&self) -> &'static str {
        match self.topology {
            Topology::Bordered => "fixed-stream",
            Topology::Torus => "fixed-stream-torus",
        }
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    fn setup(&mut self, lattice: &BitMatrix, horizon: usize, rng: &mut SimRng) {
        if self.replay {
            return;
        }
        let (n_outer, _) = lattice.shape();
        let range = updatable_range(n_outer, self.topology);
        self.coords = (0..horizon)
            .map(|_| {
                let row = rng.gen_range(range.clone());
                let col = rng.gen_range(range.clone());
                [row as u32, col as u32]
            })
            .collect();
        log::debug!("Sampled {} update indices in {:?}", self.coords.len(), range);
    }

    fn next_index(&mut self, step: usize, _rng: &mut SimRng) -> Option<Coord> {
        self.coords
            .get(step)
            .map(|&[row, col]| Coord::new(row as usize, col as usize))
    }

    fn on_update(&mut self, _lattice: &BitMatrix, _coord: Coord, _changed: bool) {}

    fn remaining(&self) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        if !self.replay {
            self.coords = Vec::new();
        }
    }
}

// ============================================
// Dynamic active-vertex set
// ============================================

/// Only vertices that an update could change are kept as candidates.
///
/// Regions whose vertices all agree with their neighbourhood drop out of
/// the set, so a step costs O(1) instead of a rescan of the lattice.
#[derive(Clone, Debug)]
pub struct DynamicActiveSet {
    topology: Topology,
    n_outer: usize,
    active: ActiveVertexSet<Coord>,
}

impl DynamicActiveSet {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            n_outer: 0,
            active: ActiveVertexSet::new(),
        }
    }

    pub fn contains(&self, coord: Coord) -> bool {
        self.active.contains(&coord)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn add_if_flippable(&mut self, lattice: &BitMatrix, coord: Coord) {
        if can_flip(lattice, coord) {
            self.active.add(coord);
        }
    }
}

impl IndexingStrategy for DynamicActiveSet {
    fn name(&self) -> &'static str {
        match self.topology {
            Topology::Bordered => "dynamic-active-set",
            Topology::Torus => "dynamic-active-set-torus",
        }
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    fn setup(&mut self, lattice: &BitMatrix, _horizon: usize, _rng: &mut SimRng) {
        let (n_outer, _) = lattice.shape();
        self.n_outer = n_outer;
        self.active.clear();

        let range = updatable_range(n_outer, self.topology);
        for row in range.clone() {
            for col in range.clone() {
                self.add_if_flippable(lattice, Coord::new(row, col));
            }
        }
        log::debug!("{} of {} vertices start active", self.active.len(), range.len().pow(2));
    }

    fn next_index(&mut self, _step: usize, rng: &mut SimRng) -> Option<Coord> {
        self.active.pop_random(rng)
    }

    fn on_update(&mut self, lattice: &BitMatrix, coord: Coord, changed: bool) {
        self.add_if_flippable(lattice, coord);
        if changed {
            for neighbor in coord.neighbors(self.n_outer, self.topology) {
                self.add_if_flippable(lattice, neighbor);
            }
        }
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.active.len())
    }

    fn reset(&mut self) {
        self.active = ActiveVertexSet::new();
    }
}

// ============================================
// Strategy selection
// ============================================

/// Which strategy family a run uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    Fixed,
    Dynamic,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Fixed => write!(f, "fixed"),
            StrategyKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = GlauberError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(StrategyKind::Fixed),
            "dynamic" => Ok(StrategyKind::Dynamic),
            other => Err(GlauberError::Configuration(format!(
                "unknown strategy {other:?}, expected \"fixed\" or \"dynamic\""
            ))),
        }
    }
}

/// Either strategy, chosen at runtime.
#[derive(Clone, Debug)]
pub enum Strategy {
    Fixed(FixedStream),
    Dynamic(DynamicActiveSet),
}

impl Strategy {
    pub fn new(kind: StrategyKind, topology: Topology) -> Self {
        match kind {
            StrategyKind::Fixed => Strategy::Fixed(FixedStream::new(topology)),
            StrategyKind::Dynamic => Strategy::Dynamic(DynamicActiveSet::new(topology)),
        }
    }

    fn inner(&self) -> &dyn IndexingStrategy {
        match self {
            Strategy::Fixed(s) => s,
            Strategy::Dynamic(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn IndexingStrategy {
        match self {
            Strategy::Fixed(s) => s,
            Strategy::Dynamic(s) => s,
        }
    }
}

impl IndexingStrategy for Strategy {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn topology(&self) -> Topology {
        self.inner().topology()
    }

    fn setup(&mut self, lattice: &BitMatrix, horizon: usize, rng: &mut SimRng) {
        self.inner_mut().setup(lattice, horizon, rng)
    }

    fn next_index(&mut self, step: usize, rng: &mut SimRng) -> Option<Coord> {
        self.inner_mut().next_index(step, rng)
    }

    fn on_update(&mut self, lattice: &BitMatrix, coord: Coord, changed: bool) {
        self.inner_mut().on_update(lattice, coord, changed)
    }

    fn remaining(&self) -> Option<usize> {
        self.inner().remaining()
    }

    fn reset(&mut self) {
        self.inner_mut().reset()
    }
}
