//! `stochbb` is a symbolic-numeric engine for the algebra of independent
//! random variables: build a DAG of `Gamma`/`Normal`/`Uniform`/`Delta` atoms
//! and the combinators over them (`+`, `minimum`, `maximum`, `mixture`,
//! `condchain`), then ask the DAG for a node's density, its quantile range,
//! or joint samples.
//!
//! ```
//! use stochbb::prelude::*;
//!
//! let mut dag = Dag::new();
//! let light = dag.gamma(2.0, 50.0).unwrap();
//! let heavy = dag.gamma(2.0, 80.0).unwrap();
//! let queue = dag.sum(&[light, heavy]).unwrap();
//!
//! let mut pdf = vec![0.0; 256];
//! dag.density(queue).eval(0.0, 1000.0, &mut pdf).unwrap();
//! ```

pub use stochbb_core::*;

pub mod prelude {
    pub use stochbb_core::prelude::*;
}

/// Installs a compact `tracing` subscriber and a panic hook that logs via
/// `tracing::error!` instead of writing to stderr directly. Idempotent —
/// safe to call from every binary entry point and every test that wants
/// logs, since only the first call takes effect.
pub fn init_logging() {
    use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        use tracing_subscriber::fmt::format::FmtSpan;
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        std::panic::set_hook(Box::new(|info| {
            tracing::error!("PANIC: {}", info);
        }));

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                    .with_target(false)
                    .with_level(true)
                    .compact(),
            )
            .init();
    });
}
