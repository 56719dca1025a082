//! Node host for the Tessera consensus core.
//!
//! Wires the synchronous consensus core to the outside world: parsed
//! configuration, the serial coordinator with its persistence hooks, the
//! background purge loop, and bundle import/export. The networking layer,
//! RPC surface and finalization protocol plug in against [`Coordinator`]'s
//! receive/query methods.

mod config;
mod coordinator;

pub use config::NodeConfig;
pub use coordinator::{wall_now, Coordinator};

/// Install the node's tracing subscriber (env-filterable).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
