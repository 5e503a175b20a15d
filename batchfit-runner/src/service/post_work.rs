//! Post-work application
//!
//! Applies [`PostWorkInstructions`] once a local run has finished: results
//! are copied back first, then scratch files are removed. Listed files that
//! do not exist are skipped.

use batchfit_core::domain::artifact::{CleanInstruction, CopyInstruction, PostWorkInstructions};
use batchfit_core::error::{JobError, Result};
use batchfit_core::fs::FileSystem;
use tracing::debug;

/// Copies, then cleans
///
/// # Returns
/// Number of files copied and number of entries removed
pub fn apply(instructions: &PostWorkInstructions, fs: &dyn FileSystem) -> Result<(usize, usize)> {
    let copied = copy_files(&instructions.files_to_copy, fs)?;
    let removed = clean_files(&instructions.files_to_clean, fs)?;
    Ok((copied, removed))
}

/// Copies every listed file that exists in `copy_from` to `copy_to`
pub fn copy_files(instruction: &CopyInstruction, fs: &dyn FileSystem) -> Result<usize> {
    let mut copied = 0;

    for file in instruction.file_names() {
        let from = instruction.copy_from.join(file);
        let is_file = fs.metadata(&from).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let to = instruction.copy_to.join(file);
        fs.copy(&from, &to)
            .map_err(|e| JobError::io("copy output", &from, e))?;
        debug!("Copied {} to {}", from.display(), to.display());
        copied += 1;
    }

    Ok(copied)
}

/// Removes every listed entry that exists in `location`
///
/// Directories are removed with their contents.
pub fn clean_files(instruction: &CleanInstruction, fs: &dyn FileSystem) -> Result<usize> {
    let mut removed = 0;

    for file in instruction.file_names() {
        let path = instruction.location.join(file);
        if !fs.exists(&path) {
            continue;
        }

        fs.remove_all(&path)
            .map_err(|e| JobError::io("remove", &path, e))?;
        removed += 1;
    }

    debug!(
        "Removed {} entries from {}",
        removed,
        instruction.location.display()
    );
    Ok(removed)
}
