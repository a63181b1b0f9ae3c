use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{
    LatticeDims, SimulationParams, BITMAP_DIR_NAME, BITMAP_PARAMS_FILE_NAME, PARAMS_FILE_NAME,
    RESULT_FILE_NAME,
};
use crate::error::Result;
use crate::simulation::checkpoint::checkpoint_file_name;
use crate::simulation::{BitMatrix, RunResult};

/// Where a run puts its parameter record, checkpoints and result.
pub trait OutputSink {
    fn write_params(&mut self, params: &SimulationParams, dims: &LatticeDims) -> Result<()>;

    fn write_checkpoint(&mut self, iteration: usize, lattice: &BitMatrix) -> Result<()>;

    fn write_result(&mut self, result: &RunResult) -> Result<()>;
}

/// Run directory on disk:
///
/// ```text
/// <results_dir>/simulation-params.json
/// <results_dir>/result-dict.json
/// <results_dir>/bitmap_results/params.json
/// <results_dir>/bitmap_results/iter-<N>.bmp
/// ```
#[derive(Clone, Debug)]
pub struct DirectorySink {
    results_dir: PathBuf,
    bitmap_dir: PathBuf,
}

impl DirectorySink {
    pub fn new(results_dir: impl Into<PathBuf>) -> Result<Self> {
        let results_dir = results_dir.into();
        let bitmap_dir = results_dir.join(BITMAP_DIR_NAME);
        fs::create_dir_all(&bitmap_dir)?;
        Ok(Self {
            results_dir,
            bitmap_dir,
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn bitmap_dir(&self) -> &Path {
        &self.bitmap_dir
    }

    pub fn checkpoint_path(&self, iteration: usize) -> PathBuf {
        self.bitmap_dir.join(checkpoint_file_name(iteration))
    }
}

impl OutputSink for DirectorySink {
    fn write_params(&mut self, params: &SimulationParams, dims: &LatticeDims) -> Result<()> {
        fs::write(
            self.results_dir.join(PARAMS_FILE_NAME),
            serde_json::to_string_pretty(params)?,
        )?;

        // The bitmap directory carries n_outer so the raw files decode on their own
        let mut bitmap_params = serde_json::to_value(params)?;
        if let Some(map) = bitmap_params.as_object_mut() {
            map.insert("n_outer".to_string(), dims.n_outer.into());
        }
        fs::write(
            self.bitmap_dir.join(BITMAP_PARAMS_FILE_NAME),
            serde_json::to_string_pretty(&bitmap_params)?,
        )?;
        Ok(())
    }

    fn write_checkpoint(&mut self, iteration: usize, lattice: &BitMatrix) -> Result<()> {
        log::debug!("Saving bitmap for iteration {}", iteration);
        lattice.export(self.checkpoint_path(iteration))
    }

    fn write_result(&mut self, result: &RunResult) -> Result<()> {
        fs::write(
            self.results_dir.join(RESULT_FILE_NAME),
            serde_json::to_string(result)?,
        )?;
        Ok(())
    }
}

/// Result a run directory already holds, if the run finished.
pub fn read_result(results_dir: &Path) -> Result<Option<RunResult>> {
    let raw = match fs::read_to_string(results_dir.join(RESULT_FILE_NAME)) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut result: RunResult = serde_json::from_str(&raw)?;
    result.stop = result.recorded_stop();
    Ok(Some(result))
}

/// Keeps everything in memory; for tests and throwaway runs.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub params: Option<SimulationParams>,
    pub checkpoints: BTreeMap<usize, Vec<u8>>,
    pub results: Vec<RunResult>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the checkpoint with the highest iteration
    pub fn last_checkpoint(&self) -> Option<(usize, &[u8])> {
        self.checkpoints
            .iter()
            .next_back()
            .map(|(&iteration, bytes)| (iteration, bytes.as_slice()))
    }
}

impl OutputSink for MemorySink {
    fn write_params(&mut self, params: &SimulationParams, _dims: &LatticeDims) -> Result<()> {
        self.params = Some(params.clone());
        Ok(())
    }

    fn write_checkpoint(&mut self, iteration: usize, lattice: &BitMatrix) -> Result<()> {
        self.checkpoints.insert(iteration, lattice.as_bytes().to_vec());
        Ok(())
    }

    fn write_result(&mut self, result: &RunResult) -> Result<()> {
        self.results.push(result.clone());
        Ok(())
    }
}
