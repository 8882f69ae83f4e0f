//! File logging behind the `log` facade.
//!
//! When `logging.enabled` is set the process installs a [`FileLogger`] that
//! writes timestamped lines to the configured file and rolls it over to
//! `name.1 … name.N` when it grows past `max-file-size-kb`. Otherwise `main`
//! falls back to `env_logger` on stderr.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;

/// Parse a config level name; unknown names fall back to INFO.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARNING" | "WARN" => LevelFilter::Warn,
        "INFO" => LevelFilter::Info,
        "DEBUG" => LevelFilter::Debug,
        other => {
            eprintln!("Unknown log level '{}', defaulting to INFO", other);
            LevelFilter::Info
        }
    }
}

struct LoggerState {
    file: Option<File>,
    written: u64,
}

pub struct FileLogger {
    path: PathBuf,
    max_size: u64,
    file_count: u32,
    level: LevelFilter,
    state: Mutex<LoggerState>,
}

impl FileLogger {
    pub fn new(config: &LoggingConfig) -> std::io::Result<FileLogger> {
        let path = PathBuf::from(&config.filename);
        let append = config.mode.eq_ignore_ascii_case("append");
        let file = OpenOptions::new()
            .create(true)
            .append(append)
            .write(true)
            .truncate(!append)
            .open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(FileLogger {
            path,
            max_size: config.max_file_size_kb.max(1) * 1024,
            file_count: config.file_count.max(1),
            level: parse_level(&config.level),
            state: Mutex::new(LoggerState {
                file: Some(file),
                written,
            }),
        })
    }

    /// Install as the process-wide logger.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    /// Shift `log`, `log.1`, … down by one and reopen a fresh file.
    fn roll_over(&self, state: &mut LoggerState) {
        state.file = None;
        for i in (1..self.file_count).rev() {
            let from = rolled_name(&self.path, i);
            let to = rolled_name(&self.path, i + 1);
            let _ = std::fs::rename(&from, &to);
        }
        let _ = std::fs::rename(&self.path, rolled_name(&self.path, 1));
        if let Ok(file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            state.file = Some(file);
            state.written = 0;
        }
    }
}

fn rolled_name(path: &PathBuf, index: u32) -> PathBuf {
    let mut name = path.clone().into_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "DEBUG",
    }
}

/// Wall-clock timestamp formatted as `YYYY-MM-DD HH:MM:SS` (UTC).
fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let days = now.div_euclid(86400);
    let secs = now.rem_euclid(86400);
    // Civil-from-days conversion, valid for the Unix era.
    let (year, month, day) = {
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
        let y = yoe + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let d = doy - (153 * mp + 2) / 5 + 1;
        let m = if mp < 10 { mp + 3 } else { mp - 9 };
        (if m <= 2 { y + 1 } else { y }, m, d)
    };
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month,
        day,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    )
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] {} {}\n",
            timestamp(),
            level_tag(record.level()),
            record.args()
        );
        let mut state = self.state.lock().unwrap();
        if state.written + line.len() as u64 > self.max_size {
            self.roll_over(&mut state);
        }
        if let Some(file) = state.file.as_mut() {
            if file.write_all(line.as_bytes()).is_ok() {
                state.written += line.len() as u64;
            }
        }
    }

    fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(file) = state.file.as_mut() {
            let _ = file.flush();
        }
    }
}
