//! Process-wide library context.
//!
//! A [`LibraryContext`] stands for the connection to the device subsystem.
//! Clones share one underlying context; it is closed when the last clone and
//! the last queue opened from it are gone. Every queue opened from the same
//! context shares one queue state for as long as any of those queues lives.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::QueueShared;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Shared handle to the device subsystem.
#[derive(Clone)]
pub struct LibraryContext {
    inner: Arc<LibraryInner>,
}

struct LibraryInner {
    config: Config,
    queue: Mutex<Weak<QueueShared>>,
}

impl LibraryContext {
    /// Create a context with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(LibraryInner {
                config,
                queue: Mutex::new(Weak::new()),
            }),
        }
    }

    /// The configuration this context was created with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Check if the device manager is running.
    ///
    /// This says nothing about whether its queue is empty.
    pub fn is_subsystem_active(&self) -> bool {
        self.inner.config.control_path().exists()
    }

    /// Number of live references to this context, queues included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Fail with [`Error::OpenFailed`] if the device tree is unreachable.
    pub(crate) fn probe(&self) -> Result<()> {
        let sys_path = &self.inner.config.sys_path;
        if sys_path.is_dir() {
            Ok(())
        } else {
            Err(Error::OpenFailed(format!(
                "device subsystem unreachable: {} is not a directory",
                sys_path.display()
            )))
        }
    }

    /// The queue state shared by all queues of this context, created on
    /// first use.
    pub(crate) fn shared_queue(&self) -> Result<Arc<QueueShared>> {
        let mut slot = self
            .inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(shared) = slot.upgrade() {
            return Ok(shared);
        }
        let shared = Arc::new(QueueShared::new(&self.inner.config)?);
        log::debug!("created queue state {}", shared.id());
        *slot = Arc::downgrade(&shared);
        Ok(shared)
    }
}

impl Default for LibraryContext {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl PartialEq for LibraryContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for LibraryContext {}

impl std::fmt::Debug for LibraryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryContext")
            .field("config", &self.inner.config)
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("devqueue_ctx_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_probe_missing_sys_path() {
        let ctx = LibraryContext::new(Config::new().with_sys_path("/nonexistent/devqueue/sys"));
        assert!(matches!(ctx.probe(), Err(Error::OpenFailed(_))));
    }

    #[test]
    fn test_subsystem_active_tracks_control_socket() {
        let run = scratch_dir("run");
        let ctx = LibraryContext::new(Config::new().with_run_path(&run));
        let _ = std::fs::remove_file(run.join("control"));
        assert!(!ctx.is_subsystem_active());

        std::fs::write(run.join("control"), b"").unwrap();
        assert!(ctx.is_subsystem_active());

        std::fs::remove_dir_all(&run).unwrap();
    }

    #[test]
    fn test_clones_share_context() {
        let ctx = LibraryContext::default();
        let other = ctx.clone();
        assert_eq!(ctx, other);
        assert_eq!(ctx.ref_count(), 2);
        assert_ne!(ctx, LibraryContext::default());
    }

    #[test]
    fn test_shared_queue_is_reused_while_alive() {
        let ctx = LibraryContext::default();
        let first = ctx.shared_queue().unwrap();
        let second = ctx.shared_queue().unwrap();
        assert_eq!(first.id(), second.id());

        let id = first.id();
        drop(first);
        drop(second);
        assert_ne!(ctx.shared_queue().unwrap().id(), id);
    }
}
