//! Configuration domain types
//!
//! The configuration is loaded from `batchfit.yaml` by the runner, adjusted
//! by command-line overrides, and then shared read-only by every job built
//! from that directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Name of the configuration file looked up next to job files
pub const CONFIG_FILE_NAME: &str = "batchfit.yaml";

/// Effective configuration for a set of jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Installed compute binaries keyed by version tag
    #[serde(alias = "nonmem")]
    pub versions: BTreeMap<String, VersionEntry>,

    /// Version tag explicitly requested for this run
    pub version: Option<String>,

    /// Multi-node execution settings
    pub parallel: ParallelConfig,

    /// How aggressively scratch files are removed after a local run
    pub clean_lvl: u32,

    /// How many result files are copied back next to the job file
    pub copy_lvl: u32,

    /// Remove an existing working directory before staging
    pub overwrite: bool,

    /// Working directory name template; `{{name}}` is the job's base filename
    pub output_dir: String,

    /// Maximum number of jobs processed at the same time
    pub threads: usize,

    /// Write a `.gitignore` into each working directory
    pub git: bool,

    /// Command used to submit scripts to the grid engine
    pub grid_submit_command: String,

    /// Write the effective configuration into each working directory
    pub save_config: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            versions: BTreeMap::new(),
            version: None,
            parallel: ParallelConfig::default(),
            clean_lvl: 1,
            copy_lvl: 0,
            overwrite: false,
            output_dir: "{{name}}".to_string(),
            threads: 4,
            git: false,
            grid_submit_command: "qsub".to_string(),
            save_config: true,
        }
    }
}

impl Configuration {
    /// Checks the invariants every run depends on
    ///
    /// # Errors
    /// Returns an error if:
    /// - The version mapping is empty
    /// - More than one version is flagged as default
    /// - The worker pool bound is zero
    /// - Parallel execution is enabled with zero nodes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.versions.is_empty() {
            return Err(ConfigError::EmptyVersions);
        }

        let defaults: Vec<String> = self
            .versions
            .iter()
            .filter(|(_, entry)| entry.default)
            .map(|(tag, _)| tag.clone())
            .collect();
        if defaults.len() > 1 {
            return Err(ConfigError::MultipleDefaults(defaults));
        }

        if self.threads == 0 {
            return Err(ConfigError::Invalid(
                "threads must be greater than 0".to_string(),
            ));
        }

        if self.parallel.enabled && self.parallel.nodes == 0 {
            return Err(ConfigError::Invalid(
                "parallel execution requires at least one node".to_string(),
            ));
        }

        Ok(())
    }

    /// Selects the compute binary to run
    ///
    /// The explicitly requested tag wins; without one, the entry flagged
    /// default is used.
    ///
    /// # Returns
    /// The tag and its entry
    ///
    /// # Errors
    /// [`ConfigError::UnknownVersion`] when the requested tag is absent,
    /// [`ConfigError::NoDefaultVersion`] when nothing was requested and no
    /// entry is flagged default.
    pub fn resolve_version(&self) -> Result<(&str, &VersionEntry), ConfigError> {
        match self.version.as_deref() {
            Some(tag) if !tag.is_empty() => self
                .versions
                .get_key_value(tag)
                .map(|(tag, entry)| (tag.as_str(), entry))
                .ok_or_else(|| ConfigError::UnknownVersion(tag.to_string())),
            _ => self
                .versions
                .iter()
                .find(|(_, entry)| entry.default)
                .map(|(tag, entry)| (tag.as_str(), entry))
                .ok_or(ConfigError::NoDefaultVersion),
        }
    }
}

/// One installed version of the compute binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Installation root
    pub home: PathBuf,
    /// Executable name inside `<home>/run`
    pub executable: String,
    /// Used when no version is requested
    #[serde(default)]
    pub default: bool,
}

impl VersionEntry {
    /// Full path of the executable: `<home>/run/<executable>`
    pub fn executable_path(&self) -> PathBuf {
        Path::new(&self.home).join("run").join(&self.executable)
    }
}

/// Multi-node execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParallelConfig {
    /// Whether jobs run across several nodes
    #[serde(alias = "parallel")]
    pub enabled: bool,
    /// Total node count, head included
    pub nodes: u32,
    /// Seconds to wait for parallel work to complete
    pub timeout: u64,
    /// MPI launcher used for the head and worker processes
    pub mpi_exec_path: String,
    /// Operator-supplied parallel configuration file, used verbatim
    pub parafile: Option<PathBuf>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            nodes: 8,
            timeout: 2_147_483_647,
            mpi_exec_path: "/usr/local/mpich3/bin/mpiexec".to_string(),
            parafile: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(home: &str, default: bool) -> VersionEntry {
        VersionEntry {
            home: PathBuf::from(home),
            executable: "nmfe74".to_string(),
            default,
        }
    }

    fn config_with(entries: &[(&str, bool)]) -> Configuration {
        let mut config = Configuration::default();
        for (tag, default) in entries {
            config
                .versions
                .insert(tag.to_string(), entry(&format!("/opt/{}", tag), *default));
        }
        config
    }

    #[test]
    fn test_default_config() {
        let config = Configuration::default();
        assert_eq!(config.clean_lvl, 1);
        assert_eq!(config.copy_lvl, 0);
        assert_eq!(config.output_dir, "{{name}}");
        assert_eq!(config.parallel.nodes, 8);
        assert!(matches!(config.validate(), Err(ConfigError::EmptyVersions)));
    }

    #[test]
    fn test_resolve_default_version() {
        let config = config_with(&[("nm73", false), ("nm74", true)]);
        let (tag, entry) = config.resolve_version().unwrap();
        assert_eq!(tag, "nm74");
        assert_eq!(entry.executable_path(), PathBuf::from("/opt/nm74/run/nmfe74"));
    }

    #[test]
    fn test_resolve_requested_version() {
        let mut config = config_with(&[("nm73", false), ("nm74", true)]);
        config.version = Some("nm73".to_string());
        assert_eq!(config.resolve_version().unwrap().0, "nm73");
    }

    #[test]
    fn test_resolve_unknown_version_is_fatal() {
        let mut config = config_with(&[("nm74", true)]);
        config.version = Some("nm75".to_string());
        assert!(matches!(
            config.resolve_version(),
            Err(ConfigError::UnknownVersion(tag)) if tag == "nm75"
        ));
    }

    #[test]
    fn test_resolve_without_default() {
        let config = config_with(&[("nm74", false)]);
        assert!(matches!(
            config.resolve_version(),
            Err(ConfigError::NoDefaultVersion)
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = config_with(&[("a", true), ("b", true)]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MultipleDefaults(tags)) if tags == vec!["a", "b"]
        ));

        config.versions.get_mut("b").unwrap().default = false;
        assert!(config.validate().is_ok());

        config.threads = 0;
        assert!(config.validate().is_err());
        config.threads = 2;

        config.parallel.enabled = true;
        config.parallel.nodes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = serde_json::json!({
            "nonmem": {
                "nm74": { "home": "/opt/nm74", "executable": "nmfe74", "default": true }
            },
            "cleanLvl": 2,
            "outputDir": "{{ .Name }}_est",
            "parallel": { "parallel": true, "nodes": 4, "mpiExecPath": "/usr/bin/mpiexec" }
        });

        let config: Configuration = serde_json::from_value(json).unwrap();
        assert_eq!(config.clean_lvl, 2);
        assert_eq!(config.copy_lvl, 0);
        assert_eq!(config.output_dir, "{{ .Name }}_est");
        assert!(config.parallel.enabled);
        assert_eq!(config.parallel.nodes, 4);
        assert_eq!(config.parallel.timeout, 2_147_483_647);
        assert!(config.versions["nm74"].default);
    }
}
