use crate::config;

use flexi_logger::{DeferredNow, Duplicate, FileSpec, FlexiLoggerError, LogSpecification, Logger, LoggerHandle};

/// Starts the logger: stdout, plus files when a directory is configured
pub fn init_logger(log_config: &config::Logging) -> Result<LoggerHandle, FlexiLoggerError> {
    let mut spec = LogSpecification::builder();
    spec.module("hushlist", log_config.level);
    let logger = Logger::with(spec.build()).format(record_formatter);

    let logger = match &log_config.directory {
        Some(directory) => logger
            .log_to_file(FileSpec::default().directory(directory).basename("hushlist"))
            .duplicate_to_stdout(Duplicate::All),
        None => logger.log_to_stdout(),
    };

    logger.start()
}

fn record_formatter(
    writer: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &log::Record) -> Result<(), std::io::Error> {
    writeln!(
        writer,
        "{} {} [{}]{} {}",
        now.format_rfc3339(),
        record.level(),
        record.module_path().unwrap_or("hushlist::<unknown>"),
        record.key_values().get("rid".into()).map(|i| format!(" [{}]", i)).unwrap_or("".into()),
        record.args(),
    )
}
