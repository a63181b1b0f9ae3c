//! Checkpoint naming. The iteration a checkpoint was taken at is only
//! recorded in its file name, `iter-<N>.bmp`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{BITMAP_DIR_NAME, CHECKPOINT_EXTENSION, CHECKPOINT_PREFIX};
use crate::error::{GlauberError, Result};

pub fn checkpoint_file_name(iteration: usize) -> String {
    format!("{CHECKPOINT_PREFIX}-{iteration}.{CHECKPOINT_EXTENSION}")
}

/// Iteration index encoded in a `<prefix>-<N>.<ext>` file name
pub fn parse_checkpoint_index(path: &Path) -> Result<usize> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let malformed = || GlauberError::MalformedCheckpointName { name: name.clone() };

    let (_, tail) = name.rsplit_once('-').ok_or_else(malformed)?;
    let (digits, _ext) = tail.split_once('.').ok_or_else(malformed)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    digits.parse().map_err(|_| malformed())
}

/// Checkpoint with the highest iteration in `run_dir`'s bitmap directory.
///
/// A run directory without bitmaps has no checkpoint; files that do not
/// follow the naming scheme are skipped.
pub fn latest_checkpoint(run_dir: &Path) -> Result<Option<PathBuf>> {
    let bitmap_dir = run_dir.join(BITMAP_DIR_NAME);
    let entries = match fs::read_dir(&bitmap_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<(usize, PathBuf)> = None;
    for entry in entries {
        let path = entry?.path();
        let is_checkpoint = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| {
                n.starts_with(CHECKPOINT_PREFIX) && n.ends_with(&format!(".{CHECKPOINT_EXTENSION}"))
            });
        if !is_checkpoint {
            continue;
        }
        match parse_checkpoint_index(&path) {
            Ok(index) if latest.as_ref().map_or(true, |(best, _)| index > *best) => {
                latest = Some((index, path));
            }
            Ok(_) => {}
            Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(latest.map(|(_, path)| path))
}
