//! Artifact policy
//!
//! Decides which files a job leaves behind. Selection is driven by static
//! tables keyed by level; a level includes every table at or below it.
//!
//! Nothing here writes to disk. The only I/O is reading the staged job
//! file for declared outputs and listing the working directory.

use batchfit_core::domain::artifact::{
    CleanInstruction, CopyInstruction, PolicyLevel, PostWorkInstructions, TargetedFile,
};
use batchfit_core::domain::job::JobDescriptor;
use batchfit_core::fs::FileSystem;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, error, warn};

use crate::jobfile::find_output_files;

/// Scratch files the compute binary leaves in its working directory
const TEMPORARY_FILES: &[&str] = &[
    "background.set",
    "compile.lnk",
    "FCON",
    "FDATA",
    "FMSG",
    "FREPORT",
    "FSIZES",
    "FSTREAM",
    "FSUBS",
    "FSUBS.0",
    "FSUBS.o",
    "FSUBS_MU.F90",
    "FSUBS.f90",
    "fsubs.f90",
    "FSUBS2",
    "gfortran.txt",
    "GFCOMPILE.BAT",
    "INTER",
    "licfile.set",
    "linkc.lnk",
    "LINK.LNK",
    "LINKC.LNK",
    "locfile.set",
    "maxlim.set",
    "newline",
    "nmexec.set",
    "nmpathlist.txt",
    "nmprd4p.mod",
    "nobuild.set",
    "parafile.set",
    "parafprint.set",
    "prcompile.set",
    "prdefault.set",
    "prsame.set",
    "PRSIZES.f90",
    "rundir.set",
    "runpdir.set",
    "simparon.set",
    "temp_dir",
    "tprdefault.set",
    "trskip.set",
    "worker.set",
    "xmloff.set",
    "fort.2001",
    "fort.2002",
    "flushtime.set",
    "nonmem",
    "FPWARN",
    "condorarguments.set",
    "condoropenmpiscript.set",
    "condor.set",
    "mpiloc",
    "nmmpi.sh",
    "temp.out",
    "trashfile.xxx",
];

/// Summary matrix file suffixes
const MSF_SUFFIXES: &[&str] = &[
    "",
    "_ETAS",
    "_RMAT",
    "_SMAT",
    ".msf",
    "_ETAS.msf",
    "_RMAT.msf",
    "_SMAT.msf",
];

/// Output extensions copied back, by level
const COPY_EXTENSIONS: &[(u32, &[&str])] = &[
    (1, &[".xml", ".grd", ".shk", ".cor", ".cov", ".ext", ".lst"]),
    (2, &[".clt", ".coi", ".cpu", ".shm", ".phi"]),
    (3, MSF_SUFFIXES),
];

/// Level at which outputs declared by the job file are copied
const DECLARED_OUTPUT_LEVEL: u32 = 1;

/// Level at which the presence of any copyable file marks a conflict
const CONFLICT_LEVEL: u32 = 3;

/// Per-node scratch left behind by parallel runs
static PARALLEL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["worker[0-9]{1,}", "fort.[0-9]{1,}"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("Invalid regex pattern for parallel artifacts"))
        .collect()
});

/// Appends `name` unless it is already present
fn push_unique(files: &mut Vec<String>, name: String) {
    if !files.contains(&name) {
        files.push(name);
    }
}

/// Scratch files removable at `level`
///
/// Level 0 selects nothing. Level 1 selects the temporary files plus the
/// summary matrix variants of `base_name` with its first `run` replaced by
/// `msfb`. Higher levels add nothing further yet.
pub fn cleanable_files(base_name: &str, level: u32) -> Vec<String> {
    let mut files = Vec::new();
    if level < 1 {
        return files;
    }

    for name in TEMPORARY_FILES {
        push_unique(&mut files, name.to_string());
    }
    for suffix in MSF_SUFFIXES {
        let name = format!("{}{}", base_name, suffix).replacen("run", "msfb", 1);
        push_unique(&mut files, name);
    }

    files
}

/// Entries of `dir` left behind by parallel workers
///
/// A listing failure is logged and yields nothing.
fn parallel_artifacts(dir: &Path, fs: &dyn FileSystem) -> Vec<String> {
    match fs.list(dir) {
        Ok(names) => names
            .into_iter()
            .filter(|name| PARALLEL_PATTERNS.iter().any(|re| re.is_match(name)))
            .collect(),
        Err(e) => {
            warn!(
                "Unable to read {} for parallel files to clean up: {}",
                dir.display(),
                e
            );
            Vec::new()
        }
    }
}

/// Builds the clean instruction for a job
///
/// # Arguments
/// * `job` - Staged job; its configuration supplies the level
/// * `fs` - Filesystem used to scan for parallel artifacts
/// * `exceptions` - Names never removed, whatever matched them
pub fn files_to_clean(
    job: &JobDescriptor,
    fs: &dyn FileSystem,
    exceptions: &[String],
) -> CleanInstruction {
    let (level, parallel) = job
        .configuration
        .as_ref()
        .map(|config| (config.clean_lvl, config.parallel.enabled))
        .unwrap_or((0, false));

    let mut names = cleanable_files(&job.base_name, level);
    if parallel {
        for name in parallel_artifacts(&job.working_dir, fs) {
            push_unique(&mut names, name);
        }
    }

    let files_to_remove = names
        .into_iter()
        .filter(|name| !exceptions.contains(name))
        .map(|name| TargetedFile::new(name, PolicyLevel::Level(level)))
        .collect();

    CleanInstruction {
        location: job.working_dir.clone(),
        files_to_remove,
    }
}

/// Result files worth copying back at `level`
///
/// # Arguments
/// * `job_file` - Job file name, e.g. `run001.mod`
/// * `level` - Copy level
/// * `dir` - Directory holding the staged job file
/// * `fs` - Filesystem used to read the job file
///
/// An unreadable job file is logged and contributes no declared outputs.
pub fn copyable_files(job_file: &str, level: u32, dir: &Path, fs: &dyn FileSystem) -> Vec<String> {
    let base_name = job_file.split('.').next().unwrap_or_default();
    let mut files = Vec::new();

    if level >= DECLARED_OUTPUT_LEVEL {
        match fs.read_lines(&dir.join(job_file)) {
            Ok(lines) => {
                for name in find_output_files(&lines) {
                    push_unique(&mut files, name);
                }
            }
            Err(e) => {
                error!(
                    "[{}] Unable to read {} to locate its output files, none will be copied: {}",
                    base_name,
                    job_file,
                    e
                );
            }
        }
    }

    for (key, extensions) in COPY_EXTENSIONS {
        if *key > level {
            continue;
        }
        for extension in *extensions {
            push_unique(&mut files, format!("{}{}", base_name, extension).trim().to_string());
        }
    }

    files
}

/// Builds the copy instruction for a job
///
/// Mandatory files come first, tagged [`PolicyLevel::Always`].
pub fn files_to_copy(
    job: &JobDescriptor,
    fs: &dyn FileSystem,
    mandatory: &[String],
) -> CopyInstruction {
    let level = job
        .configuration
        .as_ref()
        .map(|config| config.copy_lvl)
        .unwrap_or(0);

    let mut files_to_copy: Vec<TargetedFile> = Vec::new();
    for name in mandatory {
        if !files_to_copy.iter().any(|f| &f.file == name) {
            files_to_copy.push(TargetedFile::new(name.clone(), PolicyLevel::Always));
        }
    }

    for name in copyable_files(&job.job_file, level, &job.working_dir, fs) {
        if !files_to_copy.iter().any(|f| f.file == name) {
            files_to_copy.push(TargetedFile::new(name, PolicyLevel::Level(level)));
        }
    }

    CopyInstruction {
        copy_from: job.working_dir.clone(),
        copy_to: job.source_dir.clone(),
        files_to_copy,
    }
}

/// Whether `dir` holds outputs from a previous run of `job_file`
///
/// A directory that cannot be listed counts as holding outputs, so the
/// operator has to decide explicitly.
pub fn does_directory_contain_outputs(fs: &dyn FileSystem, dir: &Path, job_file: &str) -> bool {
    let entries = match fs.list(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Unable to list {}, assuming outputs exist: {}", dir.display(), e);
            return true;
        }
    };

    let outputs = copyable_files(job_file, CONFLICT_LEVEL, dir, fs);
    entries.iter().any(|entry| outputs.contains(entry))
}

/// Builds everything to do after a local run
pub fn new_post_work_instructions(
    job: &JobDescriptor,
    fs: &dyn FileSystem,
    exceptions: &[String],
    mandatory: &[String],
) -> PostWorkInstructions {
    PostWorkInstructions {
        files_to_copy: files_to_copy(job, fs, mandatory),
        files_to_clean: files_to_clean(job, fs, exceptions),
    }
}
