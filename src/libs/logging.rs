//! Tracing setup for applications built on the ORM.
//!
//! Usage:
//!   RUST_LOG=awesome_orm=debug cargo run --example blog   # statement arguments and defaults
//!
//! Without `RUST_LOG` the level is `info`, or `debug` when requested.

use tracing_subscriber::EnvFilter;

use crate::libs::error::{OrmError, OrmResult};

/// Installs a compact fmt subscriber. `RUST_LOG` takes precedence over
/// `debug`.
pub fn init_tracing(debug: bool) -> OrmResult<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .compact()
        .try_init()
        .map_err(|err| OrmError::Config(format!("failed to install tracing subscriber: {err}")))
}
