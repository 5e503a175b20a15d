//! Numbered run directories
//!
//! Repeated estimations of the same job live in sibling directories named
//! `<job>_est_<n>`. These helpers suggest the next free number.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Suggested name for the next run directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRunSuggestion {
    pub suggested_name: String,
    /// Existing numbers have gaps and could be renumbered
    pub needs_renumbering: bool,
    /// No numbered directory exists yet
    pub is_first_run: bool,
}

/// Left-pads `num` with zeros to `width` digits
pub fn pad_num(num: u32, width: usize) -> String {
    format!("{:0width$}", num, width = width)
}

/// Suggests the next `<job>_est_<n>` directory
///
/// # Arguments
/// * `job_file` - Job file path; only its final component is used
/// * `dir_names` - Names of the sibling directories
/// * `padding` - Zero-pad width of the number
///
/// Names whose suffix after `<job>_est_` is not a number are ignored, as
/// are numbers too large to have a successor.
pub fn find_next_est_dir_num(
    job_file: &str,
    dir_names: &[String],
    padding: usize,
) -> NextRunSuggestion {
    let base = Path::new(job_file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| job_file.to_string());
    let prefix = format!("{}_est_", base);

    let mut existing: Vec<u32> = dir_names
        .iter()
        .filter_map(|name| name.strip_prefix(&prefix))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .filter(|num| num.checked_add(1).is_some())
        .collect();

    if existing.is_empty() {
        return NextRunSuggestion {
            suggested_name: format!("{}{}", prefix, pad_num(1, padding)),
            needs_renumbering: false,
            is_first_run: true,
        };
    }

    existing.sort_unstable();
    let highest = existing.last().copied().unwrap_or_default();
    let next = highest.saturating_add(1);

    NextRunSuggestion {
        suggested_name: format!("{}{}", prefix, pad_num(next, padding)),
        needs_renumbering: next as usize != existing.len() + 1,
        is_first_run: false,
    }
}
