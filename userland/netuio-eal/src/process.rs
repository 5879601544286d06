//! Primary/secondary process roles and the shared configuration file.
//!
//! The first process to take the exclusive lock on `<prefix>.config` becomes
//! the primary and keeps the lock, and with it write authority, for its
//! lifetime. Everybody else is a secondary.
//!
//! ```text
//!  primary                              secondary
//!  ───────                              ─────────
//!  open + try_lock ── ok                open + try_lock ── would block
//!  set_len, map, clear marker           wait for set_len, map
//!  scan, write memseg lists             poll marker ...
//!  set marker (release) ──────────────▶ ... marker seen (acquire)
//!                                       read memseg lists
//! ```

use crate::config::ProcessType;
use crate::memory::layout::{self, CONFIG_SIZE};
use crate::memory::{MemConfig, MemsegError};
use log::{debug, error, info};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Value of the completion marker once the primary finished initialization.
pub const CONFIG_MAGIC: u32 = 19_820_526;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("cannot open shared configuration {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot lock shared configuration {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot lock shared configuration {path}. Is another primary process running?")]
    PrimaryRunning { path: PathBuf },
    #[error("cannot resize shared configuration {path}: {source}")]
    Resize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot map shared configuration {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no primary process initialized {path} within {waited:?}")]
    AttachTimeout { path: PathBuf, waited: Duration },
    #[error("only the primary process may publish the shared configuration")]
    NotPrimary,
    #[error(transparent)]
    Memseg(#[from] MemsegError),
}

/// The memory-mapped shared configuration of one runtime instance.
#[derive(Debug)]
pub struct SharedConfig {
    path: PathBuf,
    role: ProcessType,
    map: MmapMut,
    /// Holds the lock when primary.
    _file: File,
}

impl SharedConfig {
    /// Open `path` and settle this process's role.
    ///
    /// With [`ProcessType::Auto`] the lock race decides. A forced primary
    /// fails if the lock is taken; a forced secondary does not try it.
    /// A secondary waits at most `timeout` for the primary to size the file.
    pub fn open(
        path: &Path,
        requested: ProcessType,
        timeout: Duration,
    ) -> Result<Self, ProcessError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| {
                error!("Cannot open '{}' for the shared configuration", path.display());
                ProcessError::Open {
                    path: path.to_owned(),
                    source,
                }
            })?;

        let role = match requested {
            ProcessType::Secondary => ProcessType::Secondary,
            ProcessType::Primary => {
                if !Self::try_lock(&file, path)? {
                    error!(
                        "Cannot create lock on '{}'. Is another primary process running?",
                        path.display()
                    );
                    return Err(ProcessError::PrimaryRunning {
                        path: path.to_owned(),
                    });
                }
                ProcessType::Primary
            }
            ProcessType::Auto => {
                let role = if Self::try_lock(&file, path)? {
                    ProcessType::Primary
                } else {
                    ProcessType::Secondary
                };
                info!("Auto-detected process type: {role}");
                role
            }
        };

        if role == ProcessType::Primary {
            Self::create(path, file)
        } else {
            Self::attach(path, file, timeout)
        }
    }

    /// `true` if the lock was taken, `false` if somebody else holds it.
    fn try_lock(file: &File, path: &Path) -> Result<bool, ProcessError> {
        match file.try_lock() {
            Ok(()) => Ok(true),
            Err(TryLockError::WouldBlock) => Ok(false),
            Err(TryLockError::Error(source)) => Err(ProcessError::Lock {
                path: path.to_owned(),
                source,
            }),
        }
    }

    fn map(path: &Path, file: &File) -> Result<MmapMut, ProcessError> {
        // SAFETY: the file is only resized by the primary, before anybody maps it.
        unsafe { MmapMut::map_mut(file) }.map_err(|source| {
            error!("Cannot mmap the shared configuration at '{}'", path.display());
            ProcessError::Map {
                path: path.to_owned(),
                source,
            }
        })
    }

    fn create(path: &Path, file: File) -> Result<Self, ProcessError> {
        let size = CONFIG_SIZE as u64;
        let resize = |source| ProcessError::Resize {
            path: path.to_owned(),
            source,
        };
        if file.metadata().map_err(resize)?.len() != size {
            file.set_len(size).map_err(resize)?;
        }

        let mut this = Self {
            path: path.to_owned(),
            role: ProcessType::Primary,
            map: Self::map(path, &file)?,
            _file: file,
        };
        this.marker().store(0, Ordering::Release);
        layout::init(&mut this.map)?;
        debug!("created shared configuration {}", path.display());
        Ok(this)
    }

    fn attach(path: &Path, file: File, timeout: Duration) -> Result<Self, ProcessError> {
        let start = Instant::now();
        loop {
            let len = file
                .metadata()
                .map_err(|source| ProcessError::Open {
                    path: path.to_owned(),
                    source,
                })?
                .len();
            if len >= CONFIG_SIZE as u64 {
                break;
            }
            if start.elapsed() >= timeout {
                return Err(ProcessError::AttachTimeout {
                    path: path.to_owned(),
                    waited: start.elapsed(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        debug!("attached to shared configuration {}", path.display());
        Ok(Self {
            path: path.to_owned(),
            role: ProcessType::Secondary,
            map: Self::map(path, &file)?,
            _file: file,
        })
    }

    #[allow(clippy::cast_ptr_alignment)]
    fn marker(&mut self) -> &AtomicU32 {
        let ptr = self.map.as_mut_ptr().cast::<u32>();
        // SAFETY: the mapping is page aligned, at least CONFIG_SIZE long and
        // outlives the returned reference. The marker is only ever accessed
        // atomically.
        unsafe { AtomicU32::from_ptr(ptr) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// [`ProcessType::Primary`] or [`ProcessType::Secondary`].
    #[must_use]
    pub const fn role(&self) -> ProcessType {
        self.role
    }

    /// Write the memory configuration. Primary only.
    pub fn publish(&mut self, config: &MemConfig) -> Result<(), ProcessError> {
        if self.role != ProcessType::Primary {
            return Err(ProcessError::NotPrimary);
        }
        layout::write(&mut self.map, config)?;
        Ok(())
    }

    /// Let secondaries in. Primary only.
    pub fn mark_complete(&mut self) -> Result<(), ProcessError> {
        if self.role != ProcessType::Primary {
            return Err(ProcessError::NotPrimary);
        }
        self.marker().store(CONFIG_MAGIC, Ordering::Release);
        Ok(())
    }

    /// Whether the primary finished initialization.
    pub fn is_complete(&mut self) -> bool {
        self.marker().load(Ordering::Acquire) == CONFIG_MAGIC
    }

    /// Poll the completion marker for at most `timeout`.
    pub fn wait_complete(&mut self, timeout: Duration) -> Result<(), ProcessError> {
        let start = Instant::now();
        while !self.is_complete() {
            if start.elapsed() >= timeout {
                return Err(ProcessError::AttachTimeout {
                    path: self.path.clone(),
                    waited: start.elapsed(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Read the memory configuration the primary published.
    pub fn load(&self) -> Result<MemConfig, ProcessError> {
        Ok(layout::read_config(&self.map)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "netuio-process-{name}-{}.config",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[test]
    fn first_opener_is_primary() {
        let path = scratch("first");
        let primary = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();
        let secondary = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();

        assert_eq!(primary.role(), ProcessType::Primary);
        assert_eq!(secondary.role(), ProcessType::Secondary);

        drop((primary, secondary));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn forced_primary_refuses_a_running_one() {
        let path = scratch("forced");
        let _primary = SharedConfig::open(&path, ProcessType::Primary, WAIT).unwrap();

        let err = SharedConfig::open(&path, ProcessType::Primary, WAIT).unwrap_err();
        assert!(matches!(err, ProcessError::PrimaryRunning { .. }));
    }

    #[test]
    fn lock_is_released_with_the_primary() {
        let path = scratch("release");
        drop(SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap());

        let again = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();
        assert_eq!(again.role(), ProcessType::Primary);
    }

    #[test]
    fn secondary_without_primary_times_out() {
        let path = scratch("orphan");
        let err = SharedConfig::open(&path, ProcessType::Secondary, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, ProcessError::AttachTimeout { .. }));
    }

    #[test]
    fn marker_gates_the_secondary() {
        let path = scratch("marker");
        let mut primary = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();
        let mut secondary = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();

        assert!(!secondary.is_complete());
        assert!(matches!(
            secondary.wait_complete(Duration::from_millis(10)),
            Err(ProcessError::AttachTimeout { .. })
        ));
        assert!(matches!(secondary.mark_complete(), Err(ProcessError::NotPrimary)));

        primary.publish(&MemConfig::new()).unwrap();
        primary.mark_complete().unwrap();

        secondary.wait_complete(WAIT).unwrap();
        assert!(secondary.load().unwrap().is_empty());
    }

    #[test]
    fn secondary_of_another_revision_is_refused() {
        let path = scratch("revision");
        let mut primary = SharedConfig::open(&path, ProcessType::Primary, WAIT).unwrap();
        primary.publish(&MemConfig::new()).unwrap();
        primary.map[4..8].copy_from_slice(&(netuio_abi::ABI_VERSION + 1).to_le_bytes());
        primary.mark_complete().unwrap();

        let mut secondary = SharedConfig::open(&path, ProcessType::Secondary, WAIT).unwrap();
        secondary.wait_complete(WAIT).unwrap();
        assert!(matches!(
            secondary.load(),
            Err(ProcessError::Memseg(MemsegError::VersionMismatch { .. }))
        ));
    }

    #[test]
    fn new_primary_clears_a_stale_marker() {
        let path = scratch("stale");
        let mut old = SharedConfig::open(&path, ProcessType::Primary, WAIT).unwrap();
        old.mark_complete().unwrap();
        drop(old);

        let mut primary = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();
        assert_eq!(primary.role(), ProcessType::Primary);
        assert!(!primary.is_complete());
    }
}
