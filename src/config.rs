use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GlauberError, Result};
use crate::simulation::Topology;

/// Iterations between progress log lines in verbose runs
pub const LOGGING_STEP: usize = 100_000;

/// Tolerance used when neither the CLI nor a parameter file gives one
pub const DEFAULT_TOL: f64 = 0.85;

/// Boundary used when neither the CLI nor a parameter file gives one
pub const DEFAULT_BOUNDARY: Boundary = Boundary::Ones;

// ============================================
// Run directory layout
// ============================================

pub const PARAMS_FILE_NAME: &str = "simulation-params.json";
pub const RESULT_FILE_NAME: &str = "result-dict.json";
pub const BITMAP_DIR_NAME: &str = "bitmap_results";
pub const BITMAP_PARAMS_FILE_NAME: &str = "params.json";
pub const BATCH_RESULTS_FILE_NAME: &str = "batch-results.json";

/// Checkpoints are named `<prefix>-<iteration>.<extension>`
pub const CHECKPOINT_PREFIX: &str = "iter";
pub const CHECKPOINT_EXTENSION: &str = "bmp";

// ============================================
// Boundary policy
// ============================================

/// What the border ring of a bordered lattice holds.
///
/// Serialized the way the parameter files spell it: `0`, `1` or `"random"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoundaryRepr", into = "BoundaryRepr")]
pub enum Boundary {
    Zeros,
    Ones,
    Random,
}

impl Boundary {
    /// The constant the border is pinned to, if any
    pub fn fixed_value(self) -> Option<bool> {
        match self {
            Boundary::Zeros => Some(false),
            Boundary::Ones => Some(true),
            Boundary::Random => None,
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Zeros => write!(f, "0"),
            Boundary::Ones => write!(f, "1"),
            Boundary::Random => write!(f, "random"),
        }
    }
}

impl FromStr for Boundary {
    type Err = GlauberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" => Ok(Boundary::Zeros),
            "1" => Ok(Boundary::Ones),
            "random" => Ok(Boundary::Random),
            other => Err(GlauberError::Configuration(format!(
                "boundary {other:?} not recognized, expected 0, 1 or \"random\""
            ))),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BoundaryRepr {
    Fixed(u8),
    Named(String),
}

impl TryFrom<BoundaryRepr> for Boundary {
    type Error = GlauberError;

    fn try_from(repr: BoundaryRepr) -> Result<Self> {
        match repr {
            BoundaryRepr::Fixed(0) => Ok(Boundary::Zeros),
            BoundaryRepr::Fixed(1) => Ok(Boundary::Ones),
            BoundaryRepr::Fixed(other) => Err(GlauberError::Configuration(format!(
                "boundary {other} not recognized, expected 0 or 1"
            ))),
            BoundaryRepr::Named(name) => name.parse(),
        }
    }
}

impl From<Boundary> for BoundaryRepr {
    fn from(boundary: Boundary) -> Self {
        match boundary {
            Boundary::Zeros => BoundaryRepr::Fixed(0),
            Boundary::Ones => BoundaryRepr::Fixed(1),
            Boundary::Random => BoundaryRepr::Named("random".to_string()),
        }
    }
}

fn default_boundary() -> Boundary {
    DEFAULT_BOUNDARY
}

// ============================================
// Simulation parameters
// ============================================

/// Parameters of a single run, as written to `simulation-params.json`.
///
/// Exactly one of `padding` and `n_outer` is needed; the other is derived
/// by [`SimulationParams::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub n_interior: usize,
    /// Initial Bernoulli density of ones
    pub p: f64,
    /// Planned horizon (number of vertex updates)
    pub t: usize,
    /// Share of ones (or zeros) in the interior that counts as fixation
    pub tol: f64,
    #[serde(default)]
    pub padding: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_outer: Option<usize>,
    /// Checkpoint interval; `None` never checkpoints mid-run
    #[serde(default)]
    pub save_bitmaps_every: Option<usize>,
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    #[serde(default = "default_boundary")]
    pub boundary: Boundary,
    /// Seed of the run's RNG; `None` derives one from the process id
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Resolved lattice geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatticeDims {
    pub n_interior: usize,
    pub padding: usize,
    pub n_outer: usize,
}

impl LatticeDims {
    /// Number of interior cells, the denominator of the trace
    pub fn target(&self) -> usize {
        self.n_interior * self.n_interior
    }
}

impl SimulationParams {
    pub fn new(n_interior: usize, p: f64, t: usize, tol: f64) -> Self {
        Self {
            n_interior,
            p,
            t,
            tol,
            padding: None,
            n_outer: None,
            save_bitmaps_every: None,
            results_dir: None,
            boundary: DEFAULT_BOUNDARY,
            random_seed: None,
        }
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn with_n_outer(mut self, n_outer: usize) -> Self {
        self.n_outer = Some(n_outer);
        self
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_checkpoint_every(mut self, every: Option<usize>) -> Self {
        self.save_bitmaps_every = every;
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }

    /// Torus runs have no border: padding 0 and a random boundary.
    pub fn into_torus(mut self) -> Self {
        self.padding = Some(0);
        self.n_outer = None;
        self.boundary = Boundary::Random;
        self
    }

    /// Read a parameter file in the `simulation-params.json` format
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Check the parameters and resolve the lattice geometry.
    pub fn validate(&self, topology: Topology) -> Result<LatticeDims> {
        let config_err = |msg: String| Err(GlauberError::Configuration(msg));

        if self.n_interior == 0 {
            return config_err("n_interior must be positive".to_string());
        }

        let n_interior = self.n_interior;
        let (padding, n_outer) = match (self.padding, self.n_outer) {
            (None, None) => return config_err("padding or n_outer must be specified".to_string()),
            (Some(padding), None) => (padding, n_interior + 2 * padding),
            (None, Some(n_outer)) => {
                if n_outer < n_interior || (n_outer - n_interior) % 2 != 0 {
                    return config_err(format!(
                        "n_outer {n_outer} cannot center an interior of {n_interior}"
                    ));
                }
                ((n_outer - n_interior) / 2, n_outer)
            }
            (Some(padding), Some(n_outer)) => {
                if n_outer != n_interior + 2 * padding {
                    return config_err(format!(
                        "n_outer {n_outer} disagrees with n_interior {n_interior} and padding {padding}"
                    ));
                }
                (padding, n_outer)
            }
        };

        match topology {
            Topology::Torus if padding != 0 => {
                return config_err(format!("torus lattices take no padding, got {padding}"));
            }
            Topology::Bordered if n_outer < 3 => {
                return config_err(format!(
                    "bordered lattice of size {n_outer} has no updatable vertices"
                ));
            }
            _ => {}
        }

        if !(0.0..=1.0).contains(&self.p) {
            return config_err(format!("p must lie in [0, 1], got {}", self.p));
        }
        if !(self.tol > 0.0 && self.tol <= 1.0) {
            return config_err(format!("tol must lie in (0, 1], got {}", self.tol));
        }
        if self.save_bitmaps_every == Some(0) {
            return config_err("save_bitmaps_every must be positive".to_string());
        }

        Ok(LatticeDims {
            n_interior,
            padding,
            n_outer,
        })
    }
}
