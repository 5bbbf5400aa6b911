//! Logging macros that cost nothing unless the `tracing` feature is enabled.
//!
//! With the feature enabled they forward to the `tracing` crate; rotations and node swaps are
//! logged at `trace` level and whole-tree operations at `debug` level:
//!
//! ```bash
//! RUST_LOG=cordyceps_avl=trace cargo run --features demo --bin avl_demo
//! ```
//!
//! Arguments are not evaluated when the feature is disabled, so they must not have side effects.

#![allow(unused_macros, unused_imports)]

/// Trace-level logging. Compiles to a no-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Debug-level logging. Compiles to a no-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
