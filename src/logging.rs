use anyhow::{Context, anyhow};
use dirs::data_local_dir;
use std::fs;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

/// Sends logs to a daily file under the local data dir; the terminal belongs to the UI.
///
/// `RUST_LOG` wins over `level`. Keep the returned guard alive until exit or
/// buffered lines are lost.
pub fn init(level: &str) -> anyhow::Result<WorkerGuard> {
    let default_level: LevelFilter = level.parse().unwrap_or(LevelFilter::INFO);
    let env = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env()?;

    let dir = data_local_dir()
        .ok_or(anyhow!("could not determine local data directory"))?
        .join("pushdeck")
        .join("logs");
    fs::create_dir_all(&dir).with_context(|| format!("Creating {:?}", &dir))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "pushdeck.log"));
    let file = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(writer);

    let registry = tracing_subscriber::registry().with(env).with(file);
    tracing::subscriber::set_global_default(registry)?;
    Ok(guard)
}

/// Trait for logging different kinds of errors
pub trait LogError {
    /// If this result is an error, log it as such
    fn log(self) -> Self;
}

impl<T> LogError for anyhow::Result<T> {
    fn log(self) -> Self {
        if let Err(err) = &self {
            tracing::error!("{err:?}");
        }
        self
    }
}

impl<T> LogError for Result<T, crate::modules::gateway::GatewayError> {
    fn log(self) -> Self {
        if let Err(err) = &self {
            tracing::warn!("{err}");
        }
        self
    }
}
