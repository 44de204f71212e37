//! Tracing initialization.
//!
//! Installs a `tracing-subscriber` registry with an env filter and the fmt layer. The filter is
//! taken from `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=smokectl=debug,tower_http=info smokectl -f config.yaml
//! ```

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize console tracing. Fails if a global subscriber is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");

    Ok(())
}
