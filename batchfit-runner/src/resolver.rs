//! Argument resolution
//!
//! Turns the raw job arguments given on the command line into job file
//! paths. An argument can be:
//! - A directory (no extension, or `.`): every job file directly inside it
//! - A range like `run[001:006].mod`: one path per number
//! - Anything else: passed through unchanged
//!
//! A bad argument is logged and skipped; it never aborts the batch.

use batchfit_core::domain::job::is_job_file;
use batchfit_core::domain::next_run::pad_num;
use batchfit_core::error::RangeError;
use batchfit_core::fs::FileSystem;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info};

/// Most job files a single range argument may expand to
pub const MAX_RANGE_SPAN: u32 = 10_000;

/// `prefix[range]suffix`
static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)\[(.*)\](.*)$").expect("Invalid regex pattern for range arguments")
});

/// Resolves raw arguments into job file paths
///
/// Order is preserved and duplicates are kept.
///
/// # Arguments
/// * `args` - Raw arguments, in the order given
/// * `fs` - Filesystem used to list directory arguments
pub fn resolve_arguments(args: &[String], fs: &dyn FileSystem) -> Vec<PathBuf> {
    let mut resolved = Vec::new();

    for arg in args {
        let path = Path::new(arg);

        if path.extension().is_none() || arg == "." {
            match list_job_files(path, fs) {
                Ok(files) => {
                    debug!("Adding {} job file(s) from directory {}", files.len(), arg);
                    resolved.extend(files);
                }
                Err(e) => {
                    error!(
                        "Issue handling {}, if this is a job file please add the extension: {}",
                        arg, e
                    );
                }
            }
            continue;
        }

        if RANGE_PATTERN.is_match(arg) {
            info!("Expanding job pattern: {}", arg);
            match expand_name_sequence(arg) {
                Ok(names) => {
                    debug!("Expanded job files: {:?}", names);
                    resolved.extend(names.into_iter().map(PathBuf::from));
                }
                Err(e) => {
                    error!("Error expanding {}: {}", arg, e);
                }
            }
            continue;
        }

        resolved.push(path.to_path_buf());
    }

    resolved
}

/// Lists job files directly inside `dir`, in lexicographic order
fn list_job_files(dir: &Path, fs: &dyn FileSystem) -> std::io::Result<Vec<PathBuf>> {
    if !fs.is_dir(dir) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a directory",
        ));
    }

    let files = fs
        .list(dir)?
        .into_iter()
        .map(|name| dir.join(name))
        .filter(|path| is_job_file(path))
        .filter(|path| fs.metadata(path).map(|m| m.is_file()).unwrap_or(false))
        .collect();

    Ok(files)
}

/// Expands `prefix[low:high]suffix` into one name per number
///
/// Numbers are zero-padded to the written width of `low`, so
/// `run[001:003].mod` gives `run001.mod`, `run002.mod`, `run003.mod`.
///
/// # Errors
/// Returns an error if the argument has no bracket, the bracket has no
/// `:`, a bound is not a decimal integer, `low > high`, or the range
/// covers more than [`MAX_RANGE_SPAN`] numbers.
pub fn expand_name_sequence(arg: &str) -> Result<Vec<String>, RangeError> {
    let captures = RANGE_PATTERN
        .captures(arg)
        .ok_or_else(|| RangeError::MissingSeparator(arg.to_string()))?;

    let prefix = captures.get(1).map_or("", |m| m.as_str());
    let range = captures.get(2).map_or("", |m| m.as_str());
    let suffix = captures.get(3).map_or("", |m| m.as_str());

    let (low_text, high_text) = range
        .split_once(':')
        .ok_or_else(|| RangeError::MissingSeparator(range.to_string()))?;

    let low = parse_bound(low_text)?;
    let high = parse_bound(high_text)?;
    if low > high {
        return Err(RangeError::Reversed { low, high });
    }
    if high - low >= MAX_RANGE_SPAN {
        return Err(RangeError::TooLarge {
            low,
            high,
            max: MAX_RANGE_SPAN,
        });
    }

    let width = low_text.trim().len();
    Ok((low..=high)
        .map(|n| format!("{}{}{}", prefix, pad_num(n, width), suffix))
        .collect())
}

fn parse_bound(text: &str) -> Result<u32, RangeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::InvalidBound(text.to_string()));
    }
    trimmed
        .parse::<u32>()
        .map_err(|_| RangeError::InvalidBound(text.to_string()))
}
