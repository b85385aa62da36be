//! Platform-specific wake-up primitives.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::*;

// Without eventfd the signal is a plain flag: pollable through try_take, but
// with no descriptor to hand to an external event loop.
#[cfg(not(target_os = "linux"))]
mod fallback;
#[cfg(not(target_os = "linux"))]
pub use fallback::*;
