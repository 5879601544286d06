//! Runtime configuration and the filesystem locations derived from it.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Instance tag used when none is configured.
pub const DEFAULT_FILE_PREFIX: &str = "rte";

/// How long a secondary waits for the primary to finish by default.
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(10);

/// Role a process plays towards the shared configuration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ProcessType {
    /// Sole writer; creates and publishes the shared configuration.
    Primary,
    /// Attaches to a configuration published by a running primary.
    Secondary,
    /// Decide at startup by racing for the configuration file lock.
    #[default]
    Auto,
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
            Self::Auto => "AUTO",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("file prefix must not be empty")]
    EmptyPrefix,
    #[error("file prefix {0:?} must not contain path separators")]
    InvalidPrefix(String),
    #[error("secondary processes need a shared configuration file")]
    SecondaryWithoutSharedConfig,
    #[error("cannot create runtime directory {path}: {source}")]
    RuntimeDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Settings of one runtime instance.
///
/// ```rust
/// # use netuio_eal::{EalConfig, ProcessType};
/// let config = EalConfig::new()
///     .with_file_prefix("fwd0")
///     .with_runtime_root("/tmp/netuio-doc")
///     .with_process_type(ProcessType::Primary);
/// config.validate().unwrap();
/// assert!(config.config_path().ends_with("fwd0.config"));
/// ```
#[derive(Clone, Debug)]
pub struct EalConfig {
    file_prefix: String,
    process_type: ProcessType,
    no_shconf: bool,
    runtime_root: PathBuf,
    attach_timeout: Duration,
    class_filter: Option<String>,
}

impl Default for EalConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EalConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            file_prefix: DEFAULT_FILE_PREFIX.to_owned(),
            process_type: ProcessType::Auto,
            no_shconf: false,
            runtime_root: std::env::temp_dir(),
            attach_timeout: DEFAULT_ATTACH_TIMEOUT,
            class_filter: None,
        }
    }

    #[must_use]
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn with_process_type(mut self, process_type: ProcessType) -> Self {
        self.process_type = process_type;
        self
    }

    /// Keep the configuration in process memory instead of a shared file.
    #[must_use]
    pub const fn with_no_shconf(mut self, no_shconf: bool) -> Self {
        self.no_shconf = no_shconf;
        self
    }

    #[must_use]
    pub fn with_runtime_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.runtime_root = root.into();
        self
    }

    #[must_use]
    pub const fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = timeout;
        self
    }

    /// Only enumerate devices of the given setup class (e.g. `"Net"`).
    #[must_use]
    pub fn with_class_filter(mut self, class: impl Into<String>) -> Self {
        self.class_filter = Some(class.into());
        self
    }

    #[must_use]
    pub fn file_prefix(&self) -> &str {
        &self.file_prefix
    }

    #[must_use]
    pub const fn process_type(&self) -> ProcessType {
        self.process_type
    }

    #[must_use]
    pub const fn no_shconf(&self) -> bool {
        self.no_shconf
    }

    #[must_use]
    pub fn runtime_root(&self) -> &Path {
        &self.runtime_root
    }

    #[must_use]
    pub const fn attach_timeout(&self) -> Duration {
        self.attach_timeout
    }

    #[must_use]
    pub fn class_filter(&self) -> Option<&str> {
        self.class_filter.as_deref()
    }

    /// Reject settings no process could start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self
            .file_prefix
            .chars()
            .any(|c| c == '/' || c == '\\' || std::path::is_separator(c))
        {
            return Err(ConfigError::InvalidPrefix(self.file_prefix.clone()));
        }
        if self.no_shconf && self.process_type == ProcessType::Secondary {
            return Err(ConfigError::SecondaryWithoutSharedConfig);
        }
        Ok(())
    }

    /// Per-instance runtime directory, `<root>/dpdk/<prefix>`.
    #[must_use]
    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_root.join("dpdk").join(&self.file_prefix)
    }

    /// Backing file of the shared configuration, `<root>/<prefix>.config`.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.runtime_root.join(format!("{}.config", self.file_prefix))
    }

    /// Create the runtime directory one level at a time.
    ///
    /// Levels that already exist are fine; another process may have won the
    /// race to create them.
    pub fn create_runtime_dir(&self) -> Result<PathBuf, ConfigError> {
        let tmp = self.runtime_root.join("dpdk");
        let dir = tmp.join(&self.file_prefix);
        for path in [&tmp, &dir] {
            match std::fs::create_dir(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(ConfigError::RuntimeDir {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let root = std::env::temp_dir()
            .join(format!("netuio-config-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn defaults() {
        let config = EalConfig::new();
        assert_eq!(config.file_prefix(), "rte");
        assert_eq!(config.process_type(), ProcessType::Auto);
        assert!(!config.no_shconf());
        assert!(config.class_filter().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn paths_follow_prefix() {
        let config = EalConfig::new().with_runtime_root("/var/tmp").with_file_prefix("a1");
        assert_eq!(config.runtime_dir(), Path::new("/var/tmp/dpdk/a1"));
        assert_eq!(config.config_path(), Path::new("/var/tmp/a1.config"));
    }

    #[test]
    fn bad_prefixes_are_rejected() {
        assert!(matches!(
            EalConfig::new().with_file_prefix("").validate(),
            Err(ConfigError::EmptyPrefix)
        ));
        assert!(matches!(
            EalConfig::new().with_file_prefix("a/b").validate(),
            Err(ConfigError::InvalidPrefix(_))
        ));
        assert!(matches!(
            EalConfig::new().with_file_prefix("a\\b").validate(),
            Err(ConfigError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn forced_secondary_needs_shared_config() {
        let config = EalConfig::new()
            .with_no_shconf(true)
            .with_process_type(ProcessType::Secondary);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SecondaryWithoutSharedConfig)
        ));
    }

    #[test]
    fn runtime_dir_creation_is_idempotent() {
        let root = scratch("rundir");
        let config = EalConfig::new().with_runtime_root(&root).with_file_prefix("p");

        let dir = config.create_runtime_dir().unwrap();
        assert!(dir.is_dir());
        assert_eq!(config.create_runtime_dir().unwrap(), dir);

        std::fs::remove_dir_all(root).unwrap();
    }
}
