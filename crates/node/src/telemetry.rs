//! Logging setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level`. Fails if a
/// subscriber is already installed.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {}", e))
}

#[cfg(test)]
mod tests {
    #[test]
    fn second_init_fails() {
        let _ = super::init("debug");
        assert!(super::init("debug").is_err());
    }
}
