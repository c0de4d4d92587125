use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Fails if a subscriber is already installed.
pub fn init() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}
