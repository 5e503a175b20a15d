//! Artifact instruction types
//!
//! The artifact policy produces these per job; the local execution path
//! applies them once the compute binary has exited.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Policy level a file was selected at
///
/// Informational only: the level records why a file is listed, it is not
/// re-checked when the instruction is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyLevel {
    /// Selected by the configured clean or copy level
    Level(u32),
    /// Mandatory file, listed regardless of level
    Always,
}

/// A file named by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetedFile {
    pub file: String,
    pub level: PolicyLevel,
}

impl TargetedFile {
    pub fn new(file: impl Into<String>, level: PolicyLevel) -> Self {
        Self {
            file: file.into(),
            level,
        }
    }
}

/// Files to remove from a working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanInstruction {
    pub location: PathBuf,
    pub files_to_remove: Vec<TargetedFile>,
}

/// Files to copy out of a working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyInstruction {
    pub copy_from: PathBuf,
    pub copy_to: PathBuf,
    pub files_to_copy: Vec<TargetedFile>,
}

/// Everything to do with a job's artifacts after it ran locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostWorkInstructions {
    pub files_to_copy: CopyInstruction,
    pub files_to_clean: CleanInstruction,
}

impl CleanInstruction {
    /// Names of the files to remove, in order
    pub fn file_names(&self) -> Vec<&str> {
        self.files_to_remove.iter().map(|f| f.file.as_str()).collect()
    }
}

impl CopyInstruction {
    /// Names of the files to copy, in order
    pub fn file_names(&self) -> Vec<&str> {
        self.files_to_copy.iter().map(|f| f.file.as_str()).collect()
    }
}
