use tracing_subscriber::EnvFilter;

use crate::{UniqueError, UniqueResult};

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default `info`)
///
/// `json` switches the output to one JSON object per line. Fails if a global
/// subscriber is already set.
pub fn init_tracing(json: bool) -> UniqueResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| UniqueError::invalid_config(format!("Failed to install tracing subscriber: {}", e)))
}
