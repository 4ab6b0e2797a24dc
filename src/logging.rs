//! # Structured Logging Module
//!
//! Console logging filtered by `RUST_LOG` (or the configured level), plus an optional JSON
//! file per process for following a workflow across ticks after the fact.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};
use uuid::Uuid;

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialize structured logging once per process
///
/// Safe to call repeatedly; an already-installed global subscriber is left in place.
pub fn init_structured_logging(config: &LoggingConfig, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];

        let log_path = match &config.log_dir {
            Some(dir) => match file_layer(config, dir, environment) {
                Ok((layer, path)) => {
                    layers.push(layer);
                    Some(path)
                }
                Err(err) => {
                    eprintln!("log directory {} unavailable: {err}", dir.display());
                    None
                }
            },
            None => None,
        };

        if tracing_subscriber::registry().with(layers).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?log_path,
            "Structured logging initialized"
        );
    });
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_filter(env_filter(&config.level))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_filter(env_filter(&config.level))
            .boxed()
    }
}

fn file_layer(
    config: &LoggingConfig,
    dir: &Path,
    environment: &str,
) -> std::io::Result<(BoxedLayer, PathBuf)> {
    fs::create_dir_all(dir)?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let file_name = log_file_name(environment, process::id(), &timestamp);
    let appender = tracing_appender::rolling::never(dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .json()
        .with_filter(env_filter(&config.level))
        .boxed();
    Ok((layer, dir.join(file_name)))
}

/// `{environment}.{pid}.{timestamp}.log`
fn log_file_name(environment: &str, pid: u32, timestamp: &str) -> String {
    format!("{environment}.{pid}.{timestamp}.log")
}

/// Log structured data for workflow operations
pub fn log_workflow_operation(
    operation: &str,
    workflow_id: Uuid,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        workflow_id = %workflow_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "WORKFLOW_OPERATION"
    );
}

/// Log structured data for task operations
pub fn log_task_operation(
    operation: &str,
    workflow_id: Uuid,
    task_id: Uuid,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        workflow_id = %workflow_id,
        task_id = %task_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "TASK_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
