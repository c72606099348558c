use std::cmp::Reverse;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::subscriber;
use tracing::{Subscriber, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};
use uuid::Uuid;

use crate::config::{TelemetrySettings, TraceSettings, project_dirs};

static TRACE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static ACTIVE_TRACE_FILE: OnceCell<PathBuf> = OnceCell::new();
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();
static RUN_ID: OnceCell<Uuid> = OnceCell::new();

const TRACE_SUFFIX: &str = ".trace.jsonl";

/// Identifier shared by every trace file and telemetry event of this process.
pub fn run_id() -> Uuid {
    *RUN_ID.get_or_init(Uuid::new_v4)
}

fn install_subscriber<S>(subscriber: S) -> Result<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    TRACING_INITIALIZED.get_or_try_init(|| subscriber::set_global_default(subscriber))?;
    Ok(())
}

/// Install tracing subscriber with optional JSON trace export.
pub fn init_tracing(service: &str, verbose: bool, telemetry: &TelemetrySettings) -> Result<()> {
    let default_level = if verbose {
        "searchload=debug,searchload_target=debug"
    } else {
        "searchload=info,searchload_target=info"
    };
    let make_env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match build_trace_file_layer(service, &telemetry.traces)? {
        Some((writer, guard, path)) => {
            let subscriber = tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().with_target(false))
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_target(true)
                        .with_writer(writer)
                        .with_filter(LevelFilter::TRACE),
                );
            let _ = TRACE_GUARD.set(guard);
            let _ = ACTIVE_TRACE_FILE.set(path);
            install_subscriber(subscriber)?;
        }
        None => {
            let subscriber = tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().with_target(false));
            install_subscriber(subscriber)?;
        }
    }

    Ok(())
}

/// Returns the trace file written by the current process, if any.
pub fn current_trace_file() -> Option<&'static PathBuf> {
    ACTIVE_TRACE_FILE.get()
}

fn build_trace_file_layer(
    service: &str,
    settings: &TraceSettings,
) -> Result<Option<(NonBlocking, WorkerGuard, PathBuf)>> {
    if !settings.enabled {
        return Ok(None);
    }

    let directory = resolve_trace_directory(settings)?;
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create trace directory {}", directory.display()))?;

    let (file, path) = create_trace_file(service, &directory)?;
    prune_old_traces(&directory, service, settings.max_files, &path)?;

    let (writer, guard) = tracing_appender::non_blocking(file);

    Ok(Some((writer, guard, path)))
}

fn resolve_trace_directory(settings: &TraceSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.directory {
        return Ok(dir.clone());
    }
    Ok(project_dirs()?.cache_dir().join("traces"))
}

fn trace_file_name(service: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let run = run_id().simple().to_string();
    format!("{service}-{timestamp}-{}{TRACE_SUFFIX}", &run[..8])
}

fn create_trace_file(service: &str, directory: &Path) -> Result<(fs::File, PathBuf)> {
    let path = directory.join(trace_file_name(service));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open trace file {}", path.display()))?;
    Ok((file, path))
}

/// Keep at most `max_files` traces of `service`, counting `keep`, newest first.
/// Each subcommand writes under its own service name and is pruned separately.
fn prune_old_traces(directory: &Path, service: &str, max_files: usize, keep: &Path) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let mut entries = trace_files(directory, service)?;
    entries.retain(|(_, path)| path != keep);
    entries.sort_by_key(|(modified, _)| Reverse(*modified));

    let retain = max_files.saturating_sub(1);
    for (_, path) in entries.into_iter().skip(retain) {
        let _ = fs::remove_file(&path);
    }
    Ok(())
}

fn trace_files(directory: &Path, service: &str) -> Result<Vec<(SystemTime, PathBuf)>> {
    let prefix = format!("{service}-");
    let mut entries = Vec::new();
    if !directory.exists() {
        return Ok(entries);
    }

    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to read trace directory {}", directory.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|value| value.to_str()) else {
            continue;
        };
        if !(name.starts_with(&prefix) && name.ends_with(TRACE_SUFFIX)) {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|metadata| metadata.modified()) else {
            continue;
        };
        entries.push((modified, path));
    }
    Ok(entries)
}

/// Records opt-in JSONL events for one run of a searchload service.
#[derive(Debug, Clone)]
pub struct ServiceTelemetry {
    service: String,
    run_id: Uuid,
    settings: TelemetrySettings,
}

impl ServiceTelemetry {
    pub fn new(service: impl Into<String>, settings: &TelemetrySettings) -> Self {
        Self {
            service: sanitize_service(service.into()),
            run_id: run_id(),
            settings: settings.clone(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_startup(&self, details: Value) {
        self.record(
            ServiceEventKind::Startup,
            Some("service started".to_string()),
            Some(details),
        );
    }

    pub fn record_shutdown(&self) {
        self.record(
            ServiceEventKind::Shutdown,
            Some("service stopped".to_string()),
            None,
        );
    }

    /// Record a structured metric or state change with additional JSON details.
    pub fn record_metric(&self, event: impl Into<String>, details: Value) {
        self.record(ServiceEventKind::Message, Some(event.into()), Some(details));
    }

    pub fn record_error<E>(&self, error: &E)
    where
        E: std::fmt::Display + std::fmt::Debug,
    {
        let details = json!({ "debug": format!("{error:?}") });
        self.record(ServiceEventKind::Error, Some(error.to_string()), Some(details));
    }

    fn record(&self, kind: ServiceEventKind, message: Option<String>, details: Option<Value>) {
        if !self.settings.enabled {
            return;
        }

        let event = ServiceEvent {
            service: self.service.clone(),
            run_id: self.run_id,
            kind,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            message,
            details,
        };
        if let Err(err) = write_service_event(&self.settings, &event) {
            warn!(service = %self.service, warning = %err, "Failed to write telemetry event");
        }
    }
}

#[derive(Clone, Serialize)]
struct ServiceEvent {
    service: String,
    run_id: Uuid,
    kind: ServiceEventKind,
    timestamp: DateTime<Utc>,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "snake_case")]
enum ServiceEventKind {
    Startup,
    Shutdown,
    Message,
    Error,
}

fn write_service_event(settings: &TelemetrySettings, event: &ServiceEvent) -> Result<()> {
    let base = match &settings.buffer_dir {
        Some(dir) => dir.clone(),
        None => project_dirs()?.data_dir().join("telemetry"),
    };
    fs::create_dir_all(&base)
        .with_context(|| format!("Failed to create telemetry directory {}", base.display()))?;

    let path = base.join(format!("{}.jsonl", event.service));
    if let Some(limit) = settings.max_buffer_bytes {
        rotate_full_buffer(&path, &event.service, limit)?;
    }

    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(&line))
        .with_context(|| format!("Failed to append telemetry event to {}", path.display()))
}

/// Move a buffer at or past `limit` bytes aside as `<service>-<timestamp>.jsonl`.
fn rotate_full_buffer(path: &Path, service: &str, limit: u64) -> Result<()> {
    let full = fs::metadata(path).is_ok_and(|metadata| metadata.len() >= limit);
    if !full {
        return Ok(());
    }

    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let rotated = path.with_file_name(format!("{service}-{timestamp}.jsonl"));
    fs::rename(path, &rotated)
        .with_context(|| format!("Failed to rotate telemetry buffer to {}", rotated.display()))
}

/// Service names become file names: lower-case ASCII, digits, `-` and `_`.
fn sanitize_service(service: String) -> String {
    service
        .to_ascii_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect()
}
