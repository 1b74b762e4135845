//! Hierarchical tracing setup, grounded on `puffin-cli::logging`: a
//! `tracing-tree` layer filtered by an `EnvFilter` plus per-target level
//! caps quieting the HTTP stack.

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};
use tracing_tree::time::Uptime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Default,
    Verbose,
}

pub(crate) fn setup_logging(level: Level) -> Result<()> {
    let default_level = match level {
        Level::Default => LevelFilter::INFO,
        Level::Verbose => LevelFilter::TRACE,
    };

    let targets = Targets::new()
        .with_target("reqwest", LevelFilter::WARN)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("tokio", LevelFilter::WARN)
        .with_default(default_level);

    let subscriber = Registry::default().with(
        tracing_tree::HierarchicalLayer::default()
            .with_targets(true)
            .with_writer(std::io::stderr)
            .with_timer(Uptime::default())
            .with_filter(EnvFilter::from_default_env())
            .with_filter(targets),
    );
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
