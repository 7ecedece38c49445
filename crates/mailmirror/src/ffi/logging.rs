//! FFI logging backend that routes logs to Swift/Kotlin via callback
//!
//! A `log` backend that forwards records to a UniFFI callback, so the
//! pipeline's `info!`/`warn!` output lands in the host's logging system.

use std::sync::{Arc, OnceLock, RwLock};

use log::{Level, Log, Metadata, Record, SetLoggerError};

use super::types::{FfiLogLevel, LogCallback};

/// Global storage for the FFI logger
static FFI_LOGGER: OnceLock<FfiLogger> = OnceLock::new();

/// Forwards to a callback when one is set, drops records otherwise
struct FfiLogger {
    callback: RwLock<Option<Arc<dyn LogCallback>>>,
    max_level: RwLock<Level>,
}

impl FfiLogger {
    fn new(max_level: Level) -> Self {
        Self {
            callback: RwLock::new(None),
            max_level: RwLock::new(max_level),
        }
    }

    fn set_callback(&self, callback: Option<Arc<dyn LogCallback>>) {
        if let Ok(mut guard) = self.callback.write() {
            *guard = callback;
        }
    }

    fn set_max_level(&self, level: Level) {
        if let Ok(mut guard) = self.max_level.write() {
            *guard = level;
        }
    }

    fn max_level(&self) -> Level {
        self.max_level.read().map(|l| *l).unwrap_or(Level::Info)
    }

    fn has_callback(&self) -> bool {
        self.callback.read().is_ok_and(|cb| cb.is_some())
    }
}

impl Log for FfiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level() && self.has_callback()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Clone the callback out so it is not called under the lock
        let callback = match self.callback.read() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };

        if let Some(callback) = callback {
            callback.on_log(
                FfiLogLevel::from(record.level()),
                record.target().to_string(),
                record.args().to_string(),
            );
        }
    }

    fn flush(&self) {}
}

/// Install the FFI logger as the global logger
///
/// Call once at startup; the callback can be set later via
/// `set_log_callback`. Fails if another logger is already installed.
pub fn init_ffi_logger(max_level: Level) -> Result<(), SetLoggerError> {
    let logger = FFI_LOGGER.get_or_init(|| FfiLogger::new(max_level));
    log::set_logger(logger)?;
    log::set_max_level(max_level.to_level_filter());
    Ok(())
}

/// Set (or clear with `None`) the callback that receives log records
pub fn set_log_callback(callback: Option<Arc<dyn LogCallback>>) {
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_callback(callback);
    }
}

/// Update the maximum log level
pub fn set_log_level(level: Level) {
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_max_level(level);
        log::set_max_level(level.to_level_filter());
    }
}

/// Install the logger and callback in one call from Swift/Kotlin
///
/// `max_level` follows `FfiLogLevel` ordering. Returns false if a different
/// logger was already installed; the callback is still registered.
#[uniffi::export]
pub fn initialize_logging(callback: Box<dyn LogCallback>, max_level: FfiLogLevel) -> bool {
    let level = Level::from(max_level);
    let installed = init_ffi_logger(level).is_ok();
    set_log_callback(Some(Arc::from(callback)));
    set_log_level(level);
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured(Mutex<Vec<(FfiLogLevel, String)>>);

    impl LogCallback for Captured {
        fn on_log(&self, level: FfiLogLevel, _target: String, message: String) {
            self.0.lock().unwrap().push((level, message));
        }
    }

    #[test]
    fn test_logger_filters_by_level_and_callback() {
        let logger = FfiLogger::new(Level::Info);
        let debug_meta = Metadata::builder().level(Level::Debug).build();
        let warn_meta = Metadata::builder().level(Level::Warn).build();

        // No callback yet
        assert!(!logger.enabled(&warn_meta));

        let captured = Arc::new(Captured::default());
        logger.set_callback(Some(captured.clone()));
        assert!(logger.enabled(&warn_meta));
        assert!(!logger.enabled(&debug_meta));

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("mailmirror::sync")
                .args(format_args!("sync failed"))
                .build(),
        );
        let got = captured.0.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].1, "sync failed");
        assert!(matches!(got[0].0, FfiLogLevel::Warn));
    }
}
