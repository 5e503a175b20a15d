//! Configuration loading
//!
//! Locates `batchfit.yaml` for a job, parses it, and layers command-line
//! overrides on top. Missing or unparsable files are fatal for the whole
//! run, so everything here returns [`ConfigError`].

use anyhow::Context;
use batchfit_core::domain::config::{CONFIG_FILE_NAME, Configuration};
use batchfit_core::error::{ConfigError, JobError};
use batchfit_core::fs::FileSystem;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Overrides collected from the command line
///
/// Every field left as `None` keeps the value from the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub version: Option<String>,
    pub parallel: Option<bool>,
    pub nodes: Option<u32>,
    pub timeout: Option<u64>,
    pub mpi_exec_path: Option<String>,
    pub parafile: Option<PathBuf>,
    pub clean_lvl: Option<u32>,
    pub copy_lvl: Option<u32>,
    pub overwrite: Option<bool>,
    pub git: Option<bool>,
    pub threads: Option<usize>,
}

impl ConfigOverrides {
    /// Applies the overrides to `config`
    pub fn apply(&self, config: &mut Configuration) {
        if let Some(version) = &self.version {
            config.version = Some(version.clone());
        }
        if let Some(parallel) = self.parallel {
            config.parallel.enabled = parallel;
        }
        if let Some(nodes) = self.nodes {
            config.parallel.nodes = nodes;
        }
        if let Some(timeout) = self.timeout {
            config.parallel.timeout = timeout;
        }
        if let Some(mpi_exec_path) = &self.mpi_exec_path {
            config.parallel.mpi_exec_path = mpi_exec_path.clone();
        }
        if let Some(parafile) = &self.parafile {
            config.parallel.parafile = Some(parafile.clone());
        }
        if let Some(clean_lvl) = self.clean_lvl {
            config.clean_lvl = clean_lvl;
        }
        if let Some(copy_lvl) = self.copy_lvl {
            config.copy_lvl = copy_lvl;
        }
        if let Some(overwrite) = self.overwrite {
            config.overwrite = overwrite;
        }
        if let Some(git) = self.git {
            config.git = git;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
    }
}

/// Finds the nearest configuration file, starting at `start_dir`
///
/// Looks in `start_dir` and then each of its ancestors.
pub fn find_configuration_file(fs: &dyn FileSystem, start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| fs.metadata(candidate).map(|m| m.is_file()).unwrap_or(false))
}

/// Parses configuration YAML
pub fn parse_configuration(text: &str) -> anyhow::Result<Configuration> {
    let config: Configuration =
        serde_yaml::from_str(text).context("Configuration is not valid YAML for batchfit")?;
    Ok(config)
}

/// Loads the nearest configuration for jobs in `start_dir`
///
/// # Returns
/// The file that was loaded and its parsed contents (overrides not applied)
///
/// # Errors
/// [`ConfigError::Missing`] if no file is found, [`ConfigError::Parse`] if
/// it cannot be read or parsed.
pub fn load_configuration(
    fs: &dyn FileSystem,
    start_dir: &Path,
) -> Result<(PathBuf, Configuration), ConfigError> {
    let path = find_configuration_file(fs, start_dir).ok_or_else(|| ConfigError::Missing {
        file_name: CONFIG_FILE_NAME.to_string(),
        searched: start_dir.to_path_buf(),
    })?;

    debug!("Loading configuration from {}", path.display());

    let parsed = fs
        .read(&path)
        .context("Failed to read configuration file")
        .and_then(|bytes| {
            let text = String::from_utf8(bytes).context("Configuration is not UTF-8")?;
            parse_configuration(&text)
        })
        .map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: format!("{:#}", e),
        })?;

    Ok((path, parsed))
}

/// Writes `config` as `batchfit.yaml` into `dir`
///
/// Records the settings a job was executed with next to its outputs.
pub fn write_configuration(
    fs: &dyn FileSystem,
    dir: &Path,
    config: &Configuration,
) -> Result<(), JobError> {
    let path = dir.join(CONFIG_FILE_NAME);
    let yaml = serde_yaml::to_string(config).map_err(|e| {
        JobError::io(
            "serialize configuration for",
            &path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;

    fs.write(&path, yaml.as_bytes())
        .map_err(|e| JobError::io("write configuration", &path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchfit_core::fs::OsFileSystem;
    use std::fs;
    use tempfile::tempdir;

    const YAML: &str = r#"
versions:
  nm74:
    home: /opt/nm74
    executable: nmfe74
    default: true
cleanLvl: 2
overwrite: true
parallel:
  enabled: true
  nodes: 4
"#;

    #[test]
    fn test_load_from_ancestor() {
        let root = tempdir().unwrap();
        let nested = root.path().join("models").join("pk");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), YAML).unwrap();

        let (path, config) = load_configuration(&OsFileSystem, &nested).unwrap();

        assert_eq!(path, root.path().join(CONFIG_FILE_NAME));
        assert_eq!(config.clean_lvl, 2);
        assert!(config.overwrite);
        assert_eq!(config.parallel.nodes, 4);
        assert_eq!(config.versions["nm74"].executable, "nmfe74");
    }

    #[test]
    fn test_nearest_file_wins() {
        let root = tempdir().unwrap();
        let nested = root.path().join("pk");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), YAML).unwrap();
        fs::write(nested.join(CONFIG_FILE_NAME), "copyLvl: 3\n").unwrap();

        let (_, config) = load_configuration(&OsFileSystem, &nested).unwrap();
        assert_eq!(config.copy_lvl, 3);
        assert!(config.versions.is_empty());
    }

    #[test]
    fn test_unparsable_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "cleanLvl: [not, a, number]\n").unwrap();

        let err = load_configuration(&OsFileSystem, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = parse_configuration(YAML).unwrap();
        let overrides = ConfigOverrides {
            version: Some("nm73".to_string()),
            parallel: Some(false),
            copy_lvl: Some(2),
            threads: Some(9),
            ..Default::default()
        };

        overrides.apply(&mut config);

        assert_eq!(config.version.as_deref(), Some("nm73"));
        assert!(!config.parallel.enabled);
        assert_eq!(config.parallel.nodes, 4);
        assert_eq!(config.copy_lvl, 2);
        assert_eq!(config.clean_lvl, 2);
        assert_eq!(config.threads, 9);
    }

    #[test]
    fn test_write_round_trips() {
        let dir = tempdir().unwrap();
        let config = parse_configuration(YAML).unwrap();

        write_configuration(&OsFileSystem, dir.path(), &config).unwrap();

        let (_, reloaded) = load_configuration(&OsFileSystem, dir.path()).unwrap();
        assert_eq!(reloaded, config);
    }
}
