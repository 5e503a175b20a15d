//! Working directory lifecycle
//!
//! Makes a job's working directory safe to execute into, then stages the
//! job file into it. Every failure here ends the job, not the batch.

use batchfit_core::domain::job::JobDescriptor;
use batchfit_core::error::{JobError, Result};
use batchfit_core::fs::FileSystem;
use tracing::{debug, info};

use crate::config::write_configuration;
use crate::jobfile::{DATA_RECORD, add_path_level_to_data};
use crate::policy::does_directory_contain_outputs;

/// Contents of the ignore file written when `git` is enabled
const GITIGNORE_CONTENTS: &str = "*\n";

/// Prepares and stages a job's working directory
///
/// - Missing directory: created with its parents
/// - Existing directory, `overwrite` on: removed and recreated
/// - Existing directory, `overwrite` off: kept as is unless it holds
///   outputs from a previous run, which is a [`JobError::Conflict`]
///
/// The job file is then staged, followed by the optional ignore file and
/// configuration snapshot.
///
/// # Errors
/// Returns the conflict or the first I/O failure.
pub fn prepare_working_directory(job: &JobDescriptor, fs: &dyn FileSystem) -> Result<()> {
    let id = job.log_identifier();
    let dir = &job.working_dir;
    let overwrite = job
        .configuration
        .as_ref()
        .map(|config| config.overwrite)
        .unwrap_or(false);

    if fs.is_dir(dir) {
        if overwrite {
            debug!("{} Removing directory {}", id, dir.display());
            fs.remove_all(dir)
                .map_err(|e| JobError::io("remove working directory", dir, e))?;
        } else if does_directory_contain_outputs(fs, dir, &job.job_file) {
            debug!(
                "{} Overwrite is disabled but {} holds previous outputs",
                id,
                dir.display()
            );
            return Err(JobError::Conflict(dir.clone()));
        } else {
            info!(
                "{} No previous outputs detected in {}, continuing",
                id,
                dir.display()
            );
        }
    }

    fs.create_dir_all(dir)
        .map_err(|e| JobError::io("create working directory", dir, e))?;

    stage_job_file(job, fs)?;

    let Some(config) = job.configuration.as_deref() else {
        return Ok(());
    };

    if config.git {
        debug!("{} Writing .gitignore", id);
        let path = dir.join(".gitignore");
        fs.write(&path, GITIGNORE_CONTENTS.as_bytes())
            .map_err(|e| JobError::io("write", &path, e))?;
    }

    if config.save_config {
        write_configuration(fs, dir, config)?;
    }

    Ok(())
}

/// Copies the job file into its working directory
///
/// The `$DATA` reference is shifted one directory up to account for the
/// extra level, and the source file's permissions are kept.
pub fn stage_job_file(job: &JobDescriptor, fs: &dyn FileSystem) -> Result<()> {
    let destination = job.staged_job_file();

    let lines = fs
        .read_lines(&job.path)
        .map_err(|e| JobError::io("read job file", &job.path, e))?;

    let staged: Vec<String> = lines
        .iter()
        .map(|line| {
            if line.contains(DATA_RECORD) {
                add_path_level_to_data(line)
            } else {
                line.clone()
            }
        })
        .collect();

    fs.write_lines(&destination, &staged)
        .map_err(|e| JobError::io("write staged job file", &destination, e))?;

    let permissions = fs
        .metadata(&job.path)
        .map_err(|e| JobError::io("stat job file", &job.path, e))?
        .permissions();
    fs.set_permissions(&destination, permissions)
        .map_err(|e| JobError::io("set permissions on", &destination, e))?;

    debug!(
        "{} Staged {} into {}",
        job.log_identifier(),
        job.job_file,
        job.working_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchfit_core::domain::config::{CONFIG_FILE_NAME, Configuration};
    use batchfit_core::fs::OsFileSystem;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn job_in(dir: &Path, config: Configuration) -> JobDescriptor {
        fs::write(
            dir.join("run001.mod"),
            "$PROB test\n$DATA ../data/acop.csv IGNORE=@\n$EST MAXEVAL=0\n",
        )
        .unwrap();
        JobDescriptor {
            tool_version: "test".to_string(),
            job_file: "run001.mod".to_string(),
            path: dir.join("run001.mod"),
            data_path: None,
            data_hash: None,
            base_name: "run001".to_string(),
            extension: "mod".to_string(),
            source_dir: dir.to_path_buf(),
            working_dir: dir.join("run001"),
            configuration: Some(Arc::new(config)),
            error: None,
        }
    }

    #[test]
    fn test_creates_and_stages() {
        let dir = tempdir().unwrap();
        let mut config = Configuration::default();
        config.git = true;
        let job = job_in(dir.path(), config);

        prepare_working_directory(&job, &OsFileSystem).unwrap();

        let staged = fs::read_to_string(job.staged_job_file()).unwrap();
        assert_eq!(
            staged,
            "$PROB test\n$DATA ../../data/acop.csv IGNORE=@\n$EST MAXEVAL=0\n"
        );
        assert_eq!(
            fs::read_to_string(job.working_dir.join(".gitignore")).unwrap(),
            "*\n"
        );
        assert!(job.working_dir.join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_no_snapshot_or_gitignore_when_disabled() {
        let dir = tempdir().unwrap();
        let mut config = Configuration::default();
        config.save_config = false;
        let job = job_in(dir.path(), config);

        prepare_working_directory(&job, &OsFileSystem).unwrap();

        assert!(!job.working_dir.join(".gitignore").exists());
        assert!(!job.working_dir.join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_conflict_removes_nothing() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path(), Configuration::default());
        fs::create_dir_all(&job.working_dir).unwrap();
        fs::write(job.working_dir.join("run001.lst"), "old report").unwrap();

        let err = prepare_working_directory(&job, &OsFileSystem).unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(
            fs::read_to_string(job.working_dir.join("run001.lst")).unwrap(),
            "old report"
        );
        assert!(!job.staged_job_file().exists());
    }

    #[test]
    fn test_existing_without_outputs_is_kept() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path(), Configuration::default());
        fs::create_dir_all(&job.working_dir).unwrap();
        fs::write(job.working_dir.join("notes.txt"), "keep me").unwrap();

        prepare_working_directory(&job, &OsFileSystem).unwrap();

        assert_eq!(
            fs::read_to_string(job.working_dir.join("notes.txt")).unwrap(),
            "keep me"
        );
        assert!(job.staged_job_file().exists());
    }

    #[test]
    fn test_overwrite_recreates_directory() {
        let dir = tempdir().unwrap();
        let mut config = Configuration::default();
        config.overwrite = true;
        let job = job_in(dir.path(), config);
        fs::create_dir_all(job.working_dir.join("temp_dir")).unwrap();
        fs::write(job.working_dir.join("run001.lst"), "old").unwrap();

        prepare_working_directory(&job, &OsFileSystem).unwrap();

        assert!(!job.working_dir.join("run001.lst").exists());
        assert!(!job.working_dir.join("temp_dir").exists());
        assert!(job.staged_job_file().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let job = job_in(dir.path(), Configuration::default());
        fs::set_permissions(&job.path, fs::Permissions::from_mode(0o750)).unwrap();
        fs::create_dir_all(&job.working_dir).unwrap();

        stage_job_file(&job, &OsFileSystem).unwrap();

        let mode = fs::metadata(job.staged_job_file()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
