//! Job descriptor building
//!
//! Turns each resolved path into a [`JobDescriptor`]. Configuration
//! problems abort the whole run and come back as `Err`; anything wrong
//! with the individual job is carried inside the descriptor instead.

use batchfit_core::domain::config::Configuration;
use batchfit_core::domain::job::{JobDescriptor, split_file_name};
use batchfit_core::error::{ConfigError, JobError};
use batchfit_core::fs::FileSystem;
use batchfit_core::template;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ConfigOverrides, load_configuration};
use crate::jobfile::find_data_path;

/// Builds descriptors, loading each directory's configuration once
pub struct DescriptorBuilder {
    fs: Arc<dyn FileSystem>,
    overrides: ConfigOverrides,
    cwd: PathBuf,
    configurations: HashMap<PathBuf, Arc<Configuration>>,
}

impl DescriptorBuilder {
    /// Creates a new builder
    ///
    /// # Arguments
    /// * `fs` - Filesystem capability
    /// * `overrides` - Command-line overrides applied to every loaded file
    /// * `cwd` - Directory relative paths are resolved against
    pub fn new(fs: Arc<dyn FileSystem>, overrides: ConfigOverrides, cwd: PathBuf) -> Self {
        Self {
            fs,
            overrides,
            cwd,
            configurations: HashMap::new(),
        }
    }

    /// Builds the descriptor for one resolved path
    ///
    /// # Returns
    /// A ready descriptor, or one carrying its terminal error
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the job's configuration is missing,
    /// unparsable, or cannot resolve a compute binary. No job can run in
    /// that case, so the caller should stop.
    pub fn build(&mut self, path: &Path) -> Result<JobDescriptor, ConfigError> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };

        match self.fs.metadata(&path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                let source =
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory");
                let error = JobError::NotFound {
                    path: path.clone(),
                    source,
                };
                return Ok(JobDescriptor::failed(path, error));
            }
            Err(source) => {
                warn!("Job file {} does not exist", path.display());
                let error = JobError::NotFound {
                    path: path.clone(),
                    source,
                };
                return Ok(JobDescriptor::failed(path, error));
            }
        }

        let job_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (base_name, extension) = split_file_name(&job_file);
        let source_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let configuration = self.configuration_for(&source_dir)?;

        let rendered = template::render(&configuration.output_dir, &[("name", base_name.as_str())]);
        let dir_name = match rendered {
            Ok(name) => name,
            Err(source) => {
                return Ok(JobDescriptor::failed(
                    path,
                    JobError::Template {
                        what: "output directory",
                        source,
                    },
                ));
            }
        };
        let working_dir = source_dir.join(dir_name);

        let (data_path, data_hash) = self.dataset(&path, &source_dir);

        debug!(
            "[{}] Working directory will be {}",
            base_name,
            working_dir.display()
        );

        Ok(JobDescriptor {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            job_file,
            path,
            data_path,
            data_hash,
            base_name,
            extension,
            source_dir,
            working_dir,
            configuration: Some(configuration),
            error: None,
        })
    }

    /// Builds descriptors for every path, in order
    ///
    /// # Errors
    /// Stops at the first fatal configuration problem.
    pub fn build_all(&mut self, paths: &[PathBuf]) -> Result<Vec<JobDescriptor>, ConfigError> {
        paths.iter().map(|path| self.build(path)).collect()
    }

    /// Loads (or reuses) the effective configuration for `source_dir`
    fn configuration_for(&mut self, source_dir: &Path) -> Result<Arc<Configuration>, ConfigError> {
        if let Some(config) = self.configurations.get(source_dir) {
            return Ok(Arc::clone(config));
        }

        let (file, mut config) = load_configuration(self.fs.as_ref(), source_dir)?;
        self.overrides.apply(&mut config);
        config.validate()?;

        let (tag, _) = config.resolve_version()?;
        info!("Using configuration {} (version {})", file.display(), tag);

        let config = Arc::new(config);
        self.configurations
            .insert(source_dir.to_path_buf(), Arc::clone(&config));
        Ok(config)
    }

    /// Dataset path and content hash named by the job file
    fn dataset(&self, job_path: &Path, source_dir: &Path) -> (Option<PathBuf>, Option<String>) {
        let lines = match self.fs.read_lines(job_path) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Unable to read {} for its dataset: {}", job_path.display(), e);
                return (None, None);
            }
        };

        let Some(reference) = find_data_path(&lines) else {
            return (None, None);
        };
        let data_path = source_dir.join(reference);

        match self.fs.read(&data_path) {
            Ok(bytes) => {
                let hash = format!("{:x}", Sha256::digest(&bytes));
                (Some(data_path), Some(hash))
            }
            Err(e) => {
                warn!("Unable to hash dataset {}: {}", data_path.display(), e);
                (Some(data_path), None)
            }
        }
    }
}
