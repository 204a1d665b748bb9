use std::path::{Path, PathBuf};

use log4rs::{
    append::{console::{ConsoleAppender, Target}, file::FileAppender},
    config::{runtime::ConfigErrors, Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

const LOG_PATTERN: &str = "{h({d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M})} - {m}{n}";
const FILE_LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M} - {m}{n}";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Could not open log file {}: {1}", .0.display())]
    LogFile(PathBuf, std::io::Error),
    #[error("Invalid logging configuration: {0}")]
    Config(#[from] ConfigErrors),
    #[error("Could not install the logger: {0}")]
    Install(#[from] log::SetLoggerError),
}

/// Send log messages at `level` and above to stderr, and also to `log_file` if given.
/// A log file is appended to rather than overwritten.
pub fn init_logging(level: log::LevelFilter, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .target(Target::Stderr)
        .build();

    let mut builder = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");

    if let Some(p) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_LOG_PATTERN)))
            .append(true)
            .build(p)
            .map_err(|e| LoggingError::LogFile(p.to_path_buf(), e))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    let config = builder.build(root.build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}
