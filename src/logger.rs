//! Structured logging with an init-once process logger and context-scoped handles.
//!
//! A [`Logger`] owns a `tracing` dispatcher writing to standard output and a
//! local log file, with error records copied to standard error. Application
//! code logs through cheap [`LoggerHandle`] clones, usually obtained with
//! [`from_context`] so that the call's request id is attached automatically.
//!
//! # Examples
//!
//! ```no_run
//! use svckit::logger::{self, LogLevel, LoggerConfig};
//! use svckit::Context;
//!
//! # fn main() -> Result<(), svckit::Error> {
//! logger::init(
//!     LoggerConfig::default()
//!         .with_level(LogLevel::Info)
//!         .with_environment("production"),
//! )?;
//!
//! let ctx = Context::background().with_request_id("req-123");
//! let log = logger::from_context(&ctx);
//! log.info("Processing request"); // carries request_id=req-123
//! # Ok(())
//! # }
//! ```

use crate::context::Context;
use crate::{Error, Result};
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::Dispatch;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// Default location of the log file.
pub const DEFAULT_LOG_FILE: &str = "/tmp/logs";

/// Environment name that disables stack-trace capture.
pub const PRODUCTION: &str = "production";

const REQUEST_ID: &str = "request_id";

static GLOBAL: OnceLock<Logger> = OnceLock::new();

/// Minimum severity a logger records.
///
/// `Fatal` and `Panic` filter like `Error`; they differ in what the handle
/// does after logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something unexpected that the service recovered from.
    Warn,
    /// A failed operation.
    Error,
    /// Logged right before the process exits.
    Fatal,
    /// Logged right before the calling thread panics.
    Panic,
}

impl LogLevel {
    /// Returns the lowercase name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
            LogLevel::Panic => "panic",
        }
    }

    /// Parses a level name, falling back to `Info` for empty or unknown input.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            "panic" => Ok(LogLevel::Panic),
            other => Err(Error::Configuration(format!("Unknown log level: {other:?}"))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level to record
    pub level: LogLevel,
    /// Deployment environment; `"production"` disables stack traces
    pub environment: String,
    /// Logger name attached to every record
    pub name: String,
    /// Log file path, or `None` to log to the standard streams only
    pub file_path: Option<PathBuf>,
    /// Whether to emit JSON lines instead of human-readable text
    pub json_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            environment: "development".to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            file_path: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            json_output: false,
        }
    }
}

impl LoggerConfig {
    /// Builds a config from `LOG_LEVEL`, `APP_ENV`, `LOG_FILE` and `LOG_FORMAT`.
    ///
    /// Unset variables keep their defaults. An empty `LOG_FILE` disables the
    /// file output; `LOG_FORMAT=json` enables JSON output.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.level = LogLevel::parse_or_default(&level);
        }
        if let Ok(environment) = std::env::var("APP_ENV") {
            config.environment = environment;
        }
        if let Ok(path) = std::env::var("LOG_FILE") {
            config.file_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.json_output = format.eq_ignore_ascii_case("json");
        }
        config
    }

    /// Sets the minimum level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the environment name.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Sets the logger name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets or clears the log file.
    #[must_use]
    pub fn with_file_path(mut self, path: Option<PathBuf>) -> Self {
        self.file_path = path;
        self
    }

    /// Enables JSON output.
    #[must_use]
    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Returns `true` if stack traces are attached to error records.
    pub fn captures_stacktraces(&self) -> bool {
        self.environment != PRODUCTION
    }
}

/// An initialized logger.
///
/// Construct one with [`Logger::new`], or install the process-wide instance
/// with [`init`].
#[derive(Debug)]
pub struct Logger {
    config: LoggerConfig,
    root: LoggerHandle,
}

impl Logger {
    /// Builds a logger writing to stdout, the configured file and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the log file cannot be opened.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        let filter = config.level.filter();
        let json = config.json_output;

        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![
            fmt_layer(std::io::stdout, json, true)
                .with_filter(filter)
                .boxed(),
            fmt_layer(std::io::stderr, json, true)
                .with_filter(LevelFilter::ERROR)
                .boxed(),
        ];

        if let Some(path) = &config.file_path {
            let appender = file_appender(path)?;
            layers.push(fmt_layer(appender, json, false).with_filter(filter).boxed());
        }

        Ok(Self::from_dispatch(
            config,
            Dispatch::new(Registry::default().with(layers)),
        ))
    }

    /// Builds a logger that sends every record to `writer` only.
    pub fn with_writer<W>(config: LoggerConfig, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt_layer(writer, config.json_output, false).with_filter(config.level.filter());
        let dispatch = Dispatch::new(Registry::default().with(layer));
        Self::from_dispatch(config, dispatch)
    }

    fn from_dispatch(config: LoggerConfig, dispatch: Dispatch) -> Self {
        let root = LoggerHandle {
            shared: Arc::new(Shared {
                dispatch,
                name: config.name.clone(),
                capture_stacktraces: config.captures_stacktraces(),
            }),
            fields: Vec::new(),
        };
        Self { config, root }
    }

    /// Returns the configuration this logger was built from.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Returns a handle to this logger with no extra fields.
    pub fn handle(&self) -> LoggerHandle {
        self.root.clone()
    }

    /// Returns the `tracing` dispatcher behind this logger.
    pub fn dispatch(&self) -> &Dispatch {
        &self.root.shared.dispatch
    }

    /// Derives the handle to use for a call.
    ///
    /// Returns the logger attached to `ctx` if there is one; otherwise this
    /// logger, with a `request_id` field when `ctx` carries a non-empty
    /// request id.
    pub fn derive(&self, ctx: &Context) -> LoggerHandle {
        derive_from(ctx, || self.handle())
    }
}

/// Installs the process-wide logger.
///
/// The logger also becomes the global `tracing` dispatcher when none has been
/// set yet, so `tracing` events from the REST client reach the same outputs.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if a logger was already installed or the
/// log file cannot be opened.
pub fn init(config: LoggerConfig) -> Result<&'static Logger> {
    if GLOBAL.get().is_some() {
        return Err(already_initialized());
    }
    let logger = Logger::new(config)?;
    let dispatch = logger.dispatch().clone();
    GLOBAL.set(logger).map_err(|_| already_initialized())?;

    if tracing::dispatcher::set_global_default(dispatch).is_err() {
        tracing::debug!("global tracing dispatcher already set; svckit logger not installed as default");
    }

    GLOBAL.get().ok_or_else(already_initialized)
}

/// Returns the process-wide logger, if [`init`] has run.
pub fn global() -> Option<&'static Logger> {
    GLOBAL.get()
}

/// Returns the logger to use for a call.
///
/// In order of preference: the logger attached to `ctx`; the process-wide
/// logger with the context's request id attached as `request_id`; the
/// process-wide logger as-is. Before [`init`] the fallback is a disabled
/// handle that discards everything.
pub fn from_context(ctx: &Context) -> LoggerHandle {
    derive_from(ctx, || {
        global()
            .map(Logger::handle)
            .unwrap_or_else(LoggerHandle::disabled)
    })
}

fn derive_from(ctx: &Context, base: impl FnOnce() -> LoggerHandle) -> LoggerHandle {
    if let Some(logger) = ctx.logger() {
        return logger.clone();
    }
    match ctx.request_id() {
        Some(id) if !id.is_empty() => base().with_field(REQUEST_ID, id),
        _ => base(),
    }
}

fn already_initialized() -> Error {
    Error::Configuration("Logger already initialized".to_string())
}

fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Configuration(format!("Invalid log file path: {}", path.display())))?;
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|e| Error::Configuration(format!("Failed to open log file {}: {}", path.display(), e)))
}

fn fmt_layer<W>(writer: W, json: bool, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

#[derive(Debug)]
struct Shared {
    dispatch: Dispatch,
    name: String,
    capture_stacktraces: bool,
}

/// A cheap, cloneable handle for writing log records.
///
/// Every record carries the logger name and the call site. A `request_id`
/// field is recorded under its own key; the handle's other fields are
/// recorded together as a JSON object under `extra`. Error and worse records
/// also carry a stack trace when enabled.
#[derive(Clone)]
pub struct LoggerHandle {
    shared: Arc<Shared>,
    fields: Vec<(String, String)>,
}

impl LoggerHandle {
    /// Returns a handle that discards everything.
    pub fn disabled() -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatch: Dispatch::none(),
                name: String::new(),
                capture_stacktraces: false,
            }),
            fields: Vec::new(),
        }
    }

    /// Returns a new handle with an extra field; an existing field with the
    /// same key is replaced.
    #[must_use]
    pub fn with_field(&self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let key = key.into();
        let mut fields: Vec<_> = self
            .fields
            .iter()
            .filter(|(existing, _)| *existing != key)
            .cloned()
            .collect();
        fields.push((key, value.to_string()));
        Self {
            shared: Arc::clone(&self.shared),
            fields,
        }
    }

    /// Shorthand for `with_field("request_id", id)`.
    #[must_use]
    pub fn with_request_id(&self, request_id: impl fmt::Display) -> Self {
        self.with_field(REQUEST_ID, request_id)
    }

    /// Returns the value of a field on this handle.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the logger name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns `context` with this handle attached.
    pub fn attach(&self, context: Context) -> Context {
        context.with_logger(self.clone())
    }

    /// Logs at debug level.
    #[track_caller]
    pub fn debug(&self, message: impl fmt::Display) {
        self.emit(LogLevel::Debug, Location::caller(), &message);
    }

    /// Logs at info level.
    #[track_caller]
    pub fn info(&self, message: impl fmt::Display) {
        self.emit(LogLevel::Info, Location::caller(), &message);
    }

    /// Logs at warn level.
    #[track_caller]
    pub fn warn(&self, message: impl fmt::Display) {
        self.emit(LogLevel::Warn, Location::caller(), &message);
    }

    /// Logs at error level.
    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.emit(LogLevel::Error, Location::caller(), &message);
    }

    /// Logs at the given level.
    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        self.emit(level, Location::caller(), &message);
    }

    /// Logs the message and terminates the process with exit code 1.
    ///
    /// Nothing after this call runs; destructors are skipped.
    #[track_caller]
    pub fn fatal(&self, message: impl fmt::Display) -> ! {
        self.emit(LogLevel::Fatal, Location::caller(), &message);
        std::process::exit(1)
    }

    /// Logs the message and panics with it.
    #[track_caller]
    pub fn panic(&self, message: impl fmt::Display) -> ! {
        self.emit(LogLevel::Panic, Location::caller(), &message);
        panic!("{message}")
    }

    fn emit(&self, level: LogLevel, location: &Location<'_>, message: &dyn fmt::Display) {
        let shared = &self.shared;
        let caller = format!("{}:{}", location.file(), location.line());
        let request_id = self.field(REQUEST_ID).map(tracing::field::display);
        let extra = self
            .fields
            .iter()
            .any(|(key, _)| key != REQUEST_ID)
            .then(|| tracing::field::display(Extra(&self.fields)));
        let severity = (level > LogLevel::Error).then(|| level.as_str());
        let stacktrace = (shared.capture_stacktraces && level >= LogLevel::Error)
            .then(Backtrace::force_capture)
            .map(tracing::field::display);

        macro_rules! record {
            ($lvl:expr) => {
                tracing::event!(
                    $lvl,
                    logger = %shared.name,
                    caller = %caller,
                    request_id,
                    extra,
                    severity,
                    stacktrace,
                    "{}",
                    message
                )
            };
        }

        tracing::dispatcher::with_default(&shared.dispatch, || match level {
            LogLevel::Debug => record!(tracing::Level::DEBUG),
            LogLevel::Info => record!(tracing::Level::INFO),
            LogLevel::Warn => record!(tracing::Level::WARN),
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => {
                record!(tracing::Level::ERROR)
            }
        });
    }
}

impl fmt::Debug for LoggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerHandle")
            .field("name", &self.shared.name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Renders every field but the request id as a JSON object.
struct Extra<'a>(&'a [(String, String)]);

impl fmt::Display for Extra<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let object: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .filter(|(key, _)| key != REQUEST_ID)
            .map(|(key, value)| (key.clone(), serde_json::Value::from(value.as_str())))
            .collect();
        write!(f, "{}", serde_json::Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logger(config: LoggerConfig) -> (Logger, Capture) {
        let capture = Capture::default();
        let writer = capture.clone();
        let logger = Logger::with_writer(config, move || writer.clone());
        (logger, capture)
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("panic".parse::<LogLevel>().unwrap(), LogLevel::Panic);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::parse_or_default(""), LogLevel::Info);
        assert_eq!(LogLevel::parse_or_default("nonsense"), LogLevel::Info);
        assert_eq!(LogLevel::parse_or_default("fatal"), LogLevel::Fatal);
    }

    #[test]
    fn test_production_disables_stacktraces() {
        assert!(LoggerConfig::default().captures_stacktraces());
        assert!(!LoggerConfig::default()
            .with_environment("production")
            .captures_stacktraces());
    }

    #[test]
    fn test_records_carry_name_and_caller() {
        let (logger, capture) = capture_logger(LoggerConfig::default().with_name("orders"));
        logger.handle().info("service started");

        let out = capture.contents();
        assert!(out.contains("INFO"));
        assert!(out.contains("service started"));
        assert!(out.contains("logger=orders"));
        assert!(out.contains("src/logger.rs:"));
    }

    #[test]
    fn test_level_filter() {
        let (logger, capture) =
            capture_logger(LoggerConfig::default().with_level(LogLevel::Warn));
        let log = logger.handle();
        log.debug("hidden debug");
        log.info("hidden info");
        log.warn("visible warn");

        let out = capture.contents();
        assert!(!out.contains("hidden"));
        assert!(out.contains("visible warn"));
    }

    #[test]
    fn test_stacktrace_only_outside_production() {
        let (dev, dev_out) = capture_logger(LoggerConfig::default());
        dev.handle().error("boom");
        assert!(dev_out.contents().contains("stacktrace="));

        let (prod, prod_out) =
            capture_logger(LoggerConfig::default().with_environment("production"));
        prod.handle().error("boom");
        let out = prod_out.contents();
        assert!(out.contains("boom"));
        assert!(!out.contains("stacktrace="));
    }

    #[test]
    fn test_derive_adds_request_id() {
        let (logger, capture) = capture_logger(LoggerConfig::default());
        let ctx = Context::background().with_request_id("req-123");

        let log = logger.derive(&ctx);
        assert_eq!(log.field("request_id"), Some("req-123"));
        log.info("processing");
        assert!(capture.contents().contains("request_id=req-123"));
    }

    #[test]
    fn test_derive_prefers_attached_logger() {
        let (logger, _capture) = capture_logger(LoggerConfig::default());
        let attached = logger.handle().with_field("component", "billing");
        let ctx = attached
            .attach(Context::background())
            .with_request_id("req-999");

        let log = logger.derive(&ctx);
        assert_eq!(log.field("component"), Some("billing"));
        assert_eq!(log.field("request_id"), None);
    }

    #[test]
    fn test_derive_without_request_id() {
        let (logger, _capture) = capture_logger(LoggerConfig::default());
        let log = logger.derive(&Context::background().with_request_id(""));
        assert_eq!(log.field("request_id"), None);
    }

    #[test]
    fn test_with_field_replaces_existing_key() {
        let log = LoggerHandle::disabled()
            .with_field("user", "ann")
            .with_field("user", "bob");
        assert_eq!(log.field("user"), Some("bob"));
        log.info("discarded");
    }

    #[test]
    #[should_panic(expected = "unrecoverable")]
    fn test_panic_level_panics() {
        LoggerHandle::disabled().panic("unrecoverable");
    }

    #[test]
    fn test_json_records_keep_field_keys() {
        let (logger, capture) = capture_logger(LoggerConfig::default().with_json_output());
        let ctx = Context::background().with_request_id("req-1");
        logger.derive(&ctx).with_field("user", "ann").info("hello");

        let out = capture.contents();
        assert!(out.contains(r#""request_id":"req-1""#), "{out}");
        let record: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        let fields = &record["fields"];
        assert_eq!(fields["message"], "hello");
        assert_eq!(fields["request_id"], "req-1");

        let extra: serde_json::Value =
            serde_json::from_str(fields["extra"].as_str().unwrap()).unwrap();
        assert_eq!(extra, serde_json::json!({"user": "ann"}));
    }

    #[test]
    fn test_request_id_alone_has_no_extra() {
        let (logger, capture) = capture_logger(LoggerConfig::default());
        logger.handle().with_request_id("req-7").warn("slow");

        let out = capture.contents();
        assert!(out.contains("request_id=req-7"));
        assert!(!out.contains("extra="));
    }
}
