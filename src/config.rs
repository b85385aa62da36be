//! Library context configuration.

use crate::journal::DEFAULT_CAPACITY;
use std::path::PathBuf;

/// Settings for a [`LibraryContext`](crate::LibraryContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the kernel device tree. Opening a queue fails if it is absent.
    pub sys_path: PathBuf,
    /// Runtime directory of the device manager. The manager counts as active
    /// while its `control` socket exists here.
    pub run_path: PathBuf,
    /// Maximum number of events held by the event log.
    pub capacity: usize,
    /// Journal file backing the event log.
    #[cfg(feature = "persist")]
    pub journal_path: Option<PathBuf>,
}

impl Config {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            sys_path: PathBuf::from("/sys"),
            run_path: PathBuf::from("/run/udev"),
            capacity: DEFAULT_CAPACITY,
            #[cfg(feature = "persist")]
            journal_path: None,
        }
    }

    /// Set the device tree root.
    pub fn with_sys_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sys_path = path.into();
        self
    }

    /// Set the device manager runtime directory.
    pub fn with_run_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_path = path.into();
        self
    }

    /// Set the event log capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Persist the event log to a journal file.
    #[cfg(feature = "persist")]
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Path of the device manager's control socket.
    pub fn control_path(&self) -> PathBuf {
        self.run_path.join("control")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sys_path, PathBuf::from("/sys"));
        assert_eq!(config.control_path(), PathBuf::from("/run/udev/control"));
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_sys_path("/tmp/sys")
            .with_run_path("/tmp/run")
            .with_capacity(8);
        assert_eq!(config.sys_path, PathBuf::from("/tmp/sys"));
        assert_eq!(config.control_path(), PathBuf::from("/tmp/run/control"));
        assert_eq!(config.capacity, 8);
    }
}
