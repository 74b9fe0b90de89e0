//! Optional tracing hooks.
//!
//! Everything here is gated on the `tracing` cargo feature. Without it the
//! macros below expand to nothing, so instrumented call sites cost nothing
//! in production builds.

/// Installs a compact subscriber printing bytepipe's trace events.
///
/// Reads `RUST_LOG` when set and falls back to `bytepipe=trace`. Meant for
/// tests and examples; does nothing without the `tracing` feature.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = std::env::var(EnvFilter::DEFAULT_ENV)
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("bytepipe=trace"));

    fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime())
        .compact()
        .init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

// With the feature on, the call sites use the real tracing macros.
#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace};

// With the feature off, swallow the arguments entirely.
#[cfg(not(feature = "tracing"))]
macro_rules! trace_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use trace_noop as trace;
