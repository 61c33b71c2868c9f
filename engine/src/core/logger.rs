//! A `log` backend that forwards records over a channel.
//!
//! Worker threads log through the `log` facade; [`ChannelLogger`] moves each record onto a
//! crossbeam channel so a single consumer (usually the binary's printer thread) decides how
//! and where they are written. Logging never blocks a worker: the channel is unbounded and a
//! disconnected receiver silently drops records.

use std::thread;

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

/// A single forwarded log record.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub level: Level,
    /// Module path (or explicit target) that emitted the record.
    pub target: String,
    /// Name of the emitting thread; workers run on threads named after themselves.
    pub thread: Option<String>,
    pub message: String,
}

pub struct ChannelLogger {
    sender: Sender<LogMessage>,
    filter: LevelFilter,
}

impl log::Log for ChannelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = self.sender.try_send(LogMessage {
                level: record.metadata().level(),
                target: record.target().to_string(),
                thread: thread::current().name().map(str::to_string),
                message: format!("{}", record.args()),
            });
        }
    }

    fn flush(&self) {}
}

impl ChannelLogger {
    pub fn new(sender: Sender<LogMessage>, filter: LevelFilter) -> Self {
        Self { sender, filter }
    }

    pub fn with_receiver(filter: LevelFilter) -> (Self, Receiver<LogMessage>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender, filter), receiver)
    }

    /// Install this logger as the global `log` backend.
    ///
    /// Fails if another logger has already been installed for the process.
    pub fn install(self) -> Result<(), SetLoggerError> {
        let filter = self.filter;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(filter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    fn record<'a>(level: Level, args: std::fmt::Arguments<'a>) -> Record<'a> {
        Record::builder()
            .level(level)
            .target("relay::test")
            .args(args)
            .build()
    }

    #[test]
    fn forwards_enabled_records() {
        let (logger, receiver) = ChannelLogger::with_receiver(LevelFilter::Info);

        logger.log(&record(Level::Info, format_args!("tick {}", 3)));

        let message = receiver.try_recv().unwrap();
        assert_eq!(message.level, Level::Info);
        assert_eq!(message.target, "relay::test");
        assert_eq!(message.message, "tick 3");
    }

    #[test]
    fn drops_records_below_filter() {
        let (logger, receiver) = ChannelLogger::with_receiver(LevelFilter::Warn);

        logger.log(&record(Level::Debug, format_args!("noise")));
        logger.log(&record(Level::Error, format_args!("boom")));

        assert_eq!(receiver.try_recv().unwrap().message, "boom");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn disconnected_receiver_is_ignored() {
        let (logger, receiver) = ChannelLogger::with_receiver(LevelFilter::Trace);
        drop(receiver);

        logger.log(&record(Level::Info, format_args!("nobody listening")));
    }
}
