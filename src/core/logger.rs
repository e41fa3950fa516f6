/// Logging facilities to record scheduler decisions during simulation.
use std::fs::File;

use log::Level;
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use crate::core::common::Time;

pub trait Logger {
    fn log_error(&mut self, time: Time, log: String);

    fn log_warn(&mut self, time: Time, log: String);

    fn log_info(&mut self, time: Time, log: String);

    fn log_debug(&mut self, time: Time, log: String);

    fn log_trace(&mut self, time: Time, log: String);

    fn save_log(&self, _path: &str) -> Result<(), std::io::Error>;
}

fn seconds(time: Time) -> f64 {
    time as f64 / 1_000_000.
}

#[derive(Default)]
pub struct StdoutLogger {}

impl Logger for StdoutLogger {
    fn log_error(&mut self, time: Time, log: String) {
        error!("[{:.6}] {}", seconds(time), log);
    }

    fn log_warn(&mut self, time: Time, log: String) {
        warn!("[{:.6}] {}", seconds(time), log);
    }

    fn log_info(&mut self, time: Time, log: String) {
        info!("[{:.6}] {}", seconds(time), log);
    }

    fn log_debug(&mut self, time: Time, log: String) {
        debug!("[{:.6}] {}", seconds(time), log);
    }

    fn log_trace(&mut self, time: Time, log: String) {
        trace!("[{:.6}] {}", seconds(time), log);
    }

    fn save_log(&self, _path: &str) -> Result<(), std::io::Error> {
        Ok(())
    }
}

impl StdoutLogger {
    pub fn new() -> Self {
        Self {}
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: f64,
    message: String,
}

pub struct FileLogger {
    log: Vec<LogEntry>,
    level: Level,
}

impl Default for FileLogger {
    fn default() -> Self {
        Self {
            log: Vec::new(),
            level: Level::Info,
        }
    }
}

impl FileLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: Level) -> Self {
        Self { log: Vec::new(), level }
    }

    fn log_internal(&mut self, time: Time, message: String, level: Level) {
        if self.level < level {
            return;
        }
        self.log.push(LogEntry {
            timestamp: seconds(time),
            message,
        });
    }
}

impl Logger for FileLogger {
    fn log_error(&mut self, time: Time, log: String) {
        self.log_internal(time, log, Level::Error)
    }

    fn log_warn(&mut self, time: Time, log: String) {
        self.log_internal(time, log, Level::Warn)
    }

    fn log_info(&mut self, time: Time, log: String) {
        self.log_internal(time, log, Level::Info)
    }

    fn log_debug(&mut self, time: Time, log: String) {
        self.log_internal(time, log, Level::Debug)
    }

    fn log_trace(&mut self, time: Time, log: String) {
        self.log_internal(time, log, Level::Trace)
    }

    fn save_log(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for entry in &self.log {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
