//! Collector runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use kubesight_common::{LoggingConfig, init_tracing};

use crate::CollectorArgs;
use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};

/// How long tasks get to finish after the shutdown signal before they are
/// aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the configuration, the logging setup and every long-running task of
/// a collector.
///
/// Tasks receive a shutdown receiver through [`shutdown_signal`](Self::shutdown_signal);
/// on Ctrl+C it flips to `true`, the runner waits up to a grace period for
/// the tasks to return and aborts whatever is left.
///
/// # Example
///
/// ```ignore
/// let args = CollectorArgs::parse();
/// let config = Config::load(&args.config)?;
/// let mut runner = CollectorRunner::new_with_args("kubesight", config, Some(&args))?;
///
/// let shutdown = runner.shutdown_signal();
/// runner.spawn(pipeline.run(shutdown));
///
/// runner.run().await?;
/// ```
pub struct CollectorRunner<C: CollectorConfig> {
    name: String,
    version: String,
    config: C,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C: CollectorConfig> CollectorRunner<C> {
    /// Initialize logging from the configuration, with an optional CLI
    /// override of the level.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&CollectorArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                ..config.logging().clone()
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| CollectorError::config(e.to_string()))?;

        tracing::info!(collector = %name, version = %version, "Starting collector");

        Ok(Self::without_tracing(name, config))
    }

    /// Build a runner that leaves the tracing subscriber alone.
    pub fn without_tracing(name: impl Into<String>, config: C) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// A receiver that turns `true` once shutdown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn a tracked task.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(future));
    }

    /// Spawn a tracked task whose error is logged.
    pub fn spawn_with_error<F, E>(&mut self, name: String, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(worker = %name, error = %e, "Worker failed");
            }
        }));
    }

    /// Run until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await
    }

    /// Run until `stop` completes, then shut every task down.
    pub async fn run_until<F>(self, stop: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            collector = %self.name,
            tasks = self.tasks.len(),
            "Collector running. Press Ctrl+C to stop."
        );

        stop.await;

        tracing::info!(collector = %self.name, "Received shutdown signal");
        // Receivers may all be gone already.
        let _ = self.shutdown_tx.send(true);

        for mut task in self.tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Task ended abnormally"),
                Err(_) => {
                    tracing::warn!("Task did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        tracing::info!(collector = %self.name, "Goodbye!");
        Ok(())
    }
}
