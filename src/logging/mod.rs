//! Structured wire logging.
//!
//! Four per-category loggers (generic adapter, LLM wire, embedding
//! wire, vector-store wire) share one lifecycle: lazy file init on the
//! first write, an idempotent `close()` that drains with a bounded
//! timeout, and a `reset()` hook for tests. A logger's correlation
//! identifier is a property of the instance; `with_correlation()`
//! returns a derived instance sharing the same transports.
//!
//! File layout under the configured base directory:
//!
//! ```text
//! logs/
//!   adapter-<timestamp>.log          or adapter-batch-<id>.log
//!   llm/
//!     llm-<timestamp>.log            (timestamped mode)
//!     llm-batch-<id>.log             (batch mode, flat)
//!     batch-<id>/llm.log             (batch-dir mode)
//!   embedding/ ...  vector/ ...      (parallel structure)
//! ```

pub mod retention;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::LoggingConfig;
use retention::RetentionPolicy;

/// Env toggles, read at (re)initialization.
pub const ENV_DISABLE_FILE_LOGS: &str = "LLM_ADAPTER_DISABLE_FILE_LOGS";
pub const ENV_DISABLE_CONSOLE_LOGS: &str = "LLM_ADAPTER_DISABLE_CONSOLE_LOGS";
pub const ENV_BATCH_ID: &str = "LLM_ADAPTER_BATCH_ID";
pub const ENV_BATCH_DIR: &str = "LLM_ADAPTER_BATCH_DIR";
pub const ENV_LLM_LOG_MAX_FILES: &str = "LLM_ADAPTER_LLM_LOG_MAX_FILES";
pub const ENV_BATCH_LOG_MAX_FILES: &str = "LLM_ADAPTER_BATCH_LOG_MAX_FILES";

/// Bounded drain window for `close()`.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_millis(1500);

// ============================================================================
// Categories and correlation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Adapter,
    Llm,
    Embedding,
    Vector,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Adapter => "adapter",
            LogCategory::Llm => "llm",
            LogCategory::Embedding => "embedding",
            LogCategory::Vector => "vector",
        }
    }

    /// Subdirectory under the base log dir; the adapter category logs
    /// flat.
    fn subdir(&self) -> Option<&'static str> {
        match self {
            LogCategory::Adapter => None,
            LogCategory::Llm => Some("llm"),
            LogCategory::Embedding => Some("embedding"),
            LogCategory::Vector => Some("vector"),
        }
    }
}

/// Correlation identifier: scalar or array, joined with `", "` in
/// pretty prints.
#[derive(Debug, Clone, Default)]
pub enum Correlation {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Correlation {
    pub fn pretty(&self) -> String {
        match self {
            Correlation::None => String::new(),
            Correlation::One(id) => id.clone(),
            Correlation::Many(ids) => ids.join(", "),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Correlation::None => Value::Null,
            Correlation::One(id) => Value::String(id.clone()),
            Correlation::Many(ids) => json!(ids),
        }
    }
}

impl From<String> for Correlation {
    fn from(id: String) -> Self {
        Correlation::One(id)
    }
}

impl From<&str> for Correlation {
    fn from(id: &str) -> Self {
        Correlation::One(id.to_string())
    }
}

impl From<Vec<String>> for Correlation {
    fn from(ids: Vec<String>) -> Self {
        Correlation::Many(ids)
    }
}

// ============================================================================
// Transport settings
// ============================================================================

#[derive(Debug, Clone)]
enum BatchMode {
    Timestamped,
    BatchFlat(String),
    BatchDir(String),
}

#[derive(Debug, Clone)]
struct Settings {
    base_dir: PathBuf,
    file_enabled: bool,
    console_enabled: bool,
    batch: BatchMode,
    llm_log_max_files: usize,
    batch_log_max_files: usize,
    max_age: Option<Duration>,
}

impl Settings {
    fn from_config(config: &LoggingConfig) -> Self {
        let env_is = |name: &str, value: &str| std::env::var(name).as_deref() == Ok(value);
        let env_usize =
            |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<usize>().ok());

        let batch = match std::env::var(ENV_BATCH_ID).ok().filter(|v| !v.is_empty()) {
            Some(id) if env_is(ENV_BATCH_DIR, "1") => BatchMode::BatchDir(id),
            Some(id) => BatchMode::BatchFlat(id),
            None => BatchMode::Timestamped,
        };

        Self {
            base_dir: config.dir.clone(),
            file_enabled: !env_is(ENV_DISABLE_FILE_LOGS, "1"),
            console_enabled: !env_is(ENV_DISABLE_CONSOLE_LOGS, "1"),
            batch,
            llm_log_max_files: env_usize(ENV_LLM_LOG_MAX_FILES)
                .unwrap_or(config.llm_log_max_files),
            batch_log_max_files: env_usize(ENV_BATCH_LOG_MAX_FILES)
                .unwrap_or(config.batch_log_max_files),
            max_age: (config.max_age_hours > 0)
                .then(|| Duration::from_secs(config.max_age_hours * 3600)),
        }
    }
}

// ============================================================================
// Transports
// ============================================================================

#[derive(Default)]
struct FileState {
    sink: Option<BufWriter<File>>,
    /// Set once opening the sink fails, so every write does not retry.
    failed: bool,
}

struct Transports {
    category: LogCategory,
    settings: RwLock<Settings>,
    file: Mutex<FileState>,
}

impl Transports {
    fn new(category: LogCategory, settings: Settings) -> Self {
        Self {
            category,
            settings: RwLock::new(settings),
            file: Mutex::new(FileState::default()),
        }
    }

    fn category_dir(&self, settings: &Settings) -> PathBuf {
        match self.category.subdir() {
            Some(sub) => settings.base_dir.join(sub),
            None => settings.base_dir.clone(),
        }
    }

    fn file_path(&self, settings: &Settings) -> PathBuf {
        let name = self.category.as_str();
        let dir = self.category_dir(settings);
        match &settings.batch {
            BatchMode::Timestamped => {
                let ts = Utc::now().format("%Y%m%d-%H%M%S");
                dir.join(format!("{name}-{ts}.log"))
            }
            BatchMode::BatchFlat(id) => dir.join(format!("{name}-batch-{id}.log")),
            BatchMode::BatchDir(id) => {
                // The adapter category has no subdir; batch-dir grouping
                // only applies to the wire categories.
                if self.category.subdir().is_some() {
                    dir.join(format!("batch-{id}")).join(format!("{name}.log"))
                } else {
                    dir.join(format!("{name}-batch-{id}.log"))
                }
            }
        }
    }

    fn ensure_sink(&self, state: &mut FileState) {
        if state.sink.is_some() || state.failed {
            return;
        }
        let settings = self.settings.read().clone();
        if !settings.file_enabled {
            state.failed = true;
            return;
        }
        let path = self.file_path(&settings);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::debug!(category = self.category.as_str(), error = %e, "Cannot create log directory");
                state.failed = true;
                return;
            }
        }
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                state.sink = Some(BufWriter::new(file));
                self.enforce_retention(&settings);
            }
            Err(e) => {
                tracing::debug!(category = self.category.as_str(), path = %path.display(), error = %e, "Cannot open log file");
                state.failed = true;
            }
        }
    }

    fn enforce_retention(&self, settings: &Settings) {
        let dir = self.category_dir(settings);
        let name = self.category.as_str();
        let timestamped = RetentionPolicy {
            key: format!("{name}-timestamped"),
            prefix: format!("{name}-2"),
            max_files: settings.llm_log_max_files,
            max_age: settings.max_age,
        };
        let batch = RetentionPolicy {
            key: format!("{name}-batch"),
            prefix: "batch-".to_string(),
            max_files: settings.batch_log_max_files,
            max_age: settings.max_age,
        };
        // Retention failures never surface past a debug line.
        if let Err(e) = retention::enforce(&dir, &timestamped) {
            tracing::debug!(dir = %dir.display(), error = %e, "Retention pass failed");
        }
        if let Err(e) = retention::enforce(&dir, &batch) {
            tracing::debug!(dir = %dir.display(), error = %e, "Retention pass failed");
        }
    }

    fn write_record(&self, record: &Value) {
        let mut state = match self.file.try_lock_for(CLOSE_DRAIN_TIMEOUT) {
            Some(state) => state,
            None => return,
        };
        self.ensure_sink(&mut state);
        if let Some(sink) = state.sink.as_mut() {
            let line = record.to_string();
            if writeln!(sink, "{line}").is_err() {
                state.failed = true;
                state.sink = None;
            }
        }
    }

    fn close(&self) {
        if let Some(mut state) = self.file.try_lock_for(CLOSE_DRAIN_TIMEOUT) {
            if let Some(sink) = state.sink.as_mut() {
                let _ = sink.flush();
            }
            state.sink = None;
            state.failed = false;
        }
    }

    fn reconfigure(&self, settings: Settings) {
        *self.settings.write() = settings;
        self.close();
    }
}

// ============================================================================
// WireLogger
// ============================================================================

/// A category logger handle. Cheap to clone; clones share transports.
#[derive(Clone)]
pub struct WireLogger {
    transports: Arc<Transports>,
    correlation: Correlation,
}

impl WireLogger {
    fn new(transports: Arc<Transports>) -> Self {
        Self {
            transports,
            correlation: Correlation::None,
        }
    }

    /// Derived instance sharing transports but carrying its own
    /// correlation data.
    pub fn with_correlation(&self, correlation: impl Into<Correlation>) -> WireLogger {
        WireLogger {
            transports: Arc::clone(&self.transports),
            correlation: correlation.into(),
        }
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    pub fn log(&self, level: &str, message: &str, fields: Value) {
        let category = self.transports.category.as_str();
        let settings_console = self.transports.settings.read().console_enabled;
        if settings_console {
            match level {
                "debug" => tracing::debug!(
                    target: "adapter::wire",
                    category,
                    correlation = %self.correlation.pretty(),
                    "{message}"
                ),
                "warn" => tracing::warn!(
                    target: "adapter::wire",
                    category,
                    correlation = %self.correlation.pretty(),
                    "{message}"
                ),
                "error" => tracing::error!(
                    target: "adapter::wire",
                    category,
                    correlation = %self.correlation.pretty(),
                    "{message}"
                ),
                _ => tracing::info!(
                    target: "adapter::wire",
                    category,
                    correlation = %self.correlation.pretty(),
                    "{message}"
                ),
            }
        }

        let mut record = Map::new();
        record.insert(
            "timestamp".to_string(),
            json!(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        record.insert("level".to_string(), json!(level));
        record.insert("category".to_string(), json!(category));
        if !matches!(self.correlation, Correlation::None) {
            record.insert("correlation".to_string(), self.correlation.to_value());
        }
        record.insert("message".to_string(), json!(message));
        if let Value::Object(extra) = fields {
            for (k, v) in extra {
                record.insert(k, v);
            }
        }
        self.transports.write_record(&Value::Object(record));
    }

    pub fn info(&self, message: &str, fields: Value) {
        self.log("info", message, fields);
    }

    pub fn debug(&self, message: &str, fields: Value) {
        self.log("debug", message, fields);
    }

    pub fn warn(&self, message: &str, fields: Value) {
        self.log("warn", message, fields);
    }

    pub fn error(&self, message: &str, fields: Value) {
        self.log("error", message, fields);
    }

    /// Flush and drop the file sink. Bounded: gives up after the drain
    /// timeout even if a writer never releases the lock. Idempotent.
    pub fn close(&self) {
        self.transports.close();
    }
}

// ============================================================================
// Global logger set
// ============================================================================

struct LoggerSet {
    adapter: Arc<Transports>,
    llm: Arc<Transports>,
    embedding: Arc<Transports>,
    vector: Arc<Transports>,
}

static LOGGERS: Lazy<LoggerSet> = Lazy::new(|| {
    let settings = Settings::from_config(&LoggingConfig::default());
    LoggerSet {
        adapter: Arc::new(Transports::new(LogCategory::Adapter, settings.clone())),
        llm: Arc::new(Transports::new(LogCategory::Llm, settings.clone())),
        embedding: Arc::new(Transports::new(LogCategory::Embedding, settings.clone())),
        vector: Arc::new(Transports::new(LogCategory::Vector, settings)),
    }
});

/// Apply a logging configuration (and re-read env toggles). Existing
/// sinks are closed and reopened lazily on the next write.
pub fn init(config: &LoggingConfig) {
    let settings = Settings::from_config(config);
    LOGGERS.adapter.reconfigure(settings.clone());
    LOGGERS.llm.reconfigure(settings.clone());
    LOGGERS.embedding.reconfigure(settings.clone());
    LOGGERS.vector.reconfigure(settings);
}

pub fn adapter_logger() -> WireLogger {
    WireLogger::new(Arc::clone(&LOGGERS.adapter))
}

pub fn llm_logger() -> WireLogger {
    WireLogger::new(Arc::clone(&LOGGERS.llm))
}

pub fn embedding_logger() -> WireLogger {
    WireLogger::new(Arc::clone(&LOGGERS.embedding))
}

pub fn vector_logger() -> WireLogger {
    WireLogger::new(Arc::clone(&LOGGERS.vector))
}

/// Drain all transports. Each drain is bounded; idempotent.
pub fn close_all() {
    LOGGERS.adapter.close();
    LOGGERS.llm.close();
    LOGGERS.embedding.close();
    LOGGERS.vector.close();
}

/// Test hook: close sinks and clear retention dedup state.
pub fn reset_all() {
    close_all();
    retention::reset_state();
}

// ============================================================================
// Redaction
// ============================================================================

const CREDENTIAL_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "api-key",
    "x-goog-api-key",
    "proxy-authorization",
];

/// Redact credential headers to `"***"` plus the last four characters.
pub fn redact_headers(headers: &HashMap<String, String>) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in headers {
        let redacted = if CREDENTIAL_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            redact_credential(value)
        } else {
            value.clone()
        };
        out.insert(name.clone(), Value::String(redacted));
    }
    out
}

pub fn redact_credential(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("***{tail}")
}
