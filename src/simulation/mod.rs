mod active_set;
mod cell;
pub mod checkpoint;
mod engine;
mod grid;
pub mod rule;
mod strategy;

pub use active_set::ActiveVertexSet;
pub use cell::{Coord, Topology, NEIGHBOR_OFFSETS};
pub use engine::{fixation_check, LatticeSimulation, RunResult, StopReason};
pub use grid::{interior_mask, BitMatrix, IndexMode};
pub use strategy::{DynamicActiveSet, FixedStream, IndexingStrategy, Strategy, StrategyKind};

/// Random source of a single run
pub type SimRng = rand_chacha::ChaCha8Rng;
