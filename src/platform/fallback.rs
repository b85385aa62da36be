//! Flag-backed signal for targets without eventfd.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Signal {
    pending: AtomicBool,
}

impl Signal {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pending: AtomicBool::new(false),
        })
    }

    pub fn notify(&self) -> Result<()> {
        self.pending.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn try_take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}
