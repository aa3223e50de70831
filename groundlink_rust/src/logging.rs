//! Tracing setup for the ground-station binaries.
//!
//! Call `init` once at startup. Library code only uses the `tracing` macros.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "groundlink=info,groundlink_core=info,groundlink_rust=info";
const DEBUG_DIRECTIVES: &str = "groundlink=debug,groundlink_core=debug,groundlink_rust=debug";

/// Installs a stderr subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `debug` selects between info and debug
/// output for this workspace's crates.
pub fn init(debug: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(if debug { DEBUG_DIRECTIVES } else { DEFAULT_DIRECTIVES })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
