use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LogFormat;

/// Installs the global subscriber. `RUST_LOG` wins over the `info` default.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(filter)
                .with(JsonStorageLayer)
                .with(BunyanFormattingLayer::new(
                    env!("CARGO_PKG_NAME").to_string(),
                    std::io::stdout,
                ));
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}
