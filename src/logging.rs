//! Tracing setup, mirroring the teacher's `logging::init_logging` call-site.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

pub struct LoggingConfig {
    pub level: Level,
    pub json_format: bool,
    pub log_dir: Option<String>,
}

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the global tracing subscriber. Idempotent: a second call is a
/// no-op, since Python-binding-style embedders may call startup twice.
pub fn init_logging(config: LoggingConfig) -> Option<WorkerGuard> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return None;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    if let Some(dir) = config.log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "model-gate.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let builder = fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false);
        if config.json_format {
            builder.json().init();
        } else {
            builder.init();
        }
        return Some(guard);
    }

    let builder = fmt().with_env_filter(filter).with_target(true);
    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
    None
}

pub fn parse_level(level: Option<&str>) -> Level {
    level
        .and_then(|s| s.to_uppercase().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}
