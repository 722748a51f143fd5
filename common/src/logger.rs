//! Logging setup shared by the binaries: colored console output plus an
//! optional (date based) log file, built with `fern`.

use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    fs,
    path::Path,
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Error while creating the logs directory: {0}")]
    Directory(#[source] std::io::Error),
    #[error("Error while opening the log file: {0}")]
    File(#[source] std::io::Error),
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let str = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{}", str)
    }
}

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "off" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => return Err("Invalid log level"),
        })
    }
}

pub fn default_logs_datetime_format() -> String {
    "[%Y-%m-%d] (%H:%M:%S%.3f)".to_string()
}

fn default_logs_path() -> String {
    "logs/".to_string()
}

fn default_filename_log() -> String {
    "pouw.log".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct LogConfig {
    /// Set log level
    #[cfg_attr(feature = "clap", clap(long, value_enum, default_value_t))]
    #[serde(default)]
    pub log_level: LogLevel,
    /// Set file log level
    /// By default, it will be the same as log level
    #[cfg_attr(feature = "clap", clap(long, value_enum))]
    #[serde(default)]
    pub file_log_level: Option<LogLevel>,
    /// Disable the log file
    #[cfg_attr(feature = "clap", clap(long))]
    #[serde(default)]
    pub disable_file_logging: bool,
    /// Disable the log filename date based
    /// If disabled, the log file will be named pouw.log instead of YYYY-MM-DD.pouw.log
    #[cfg_attr(feature = "clap", clap(long))]
    #[serde(default)]
    pub disable_file_log_date_based: bool,
    /// Disable the usage of colors in log
    #[cfg_attr(feature = "clap", clap(long))]
    #[serde(default)]
    pub disable_log_color: bool,
    /// Log filename
    #[cfg_attr(feature = "clap", clap(long, default_value_t = default_filename_log()))]
    #[serde(default = "default_filename_log")]
    pub filename_log: String,
    /// Logs directory
    #[cfg_attr(feature = "clap", clap(long, default_value_t = default_logs_path()))]
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    /// Datetime format used in log lines
    #[cfg_attr(feature = "clap", clap(long, default_value_t = default_logs_datetime_format()))]
    #[serde(default = "default_logs_datetime_format")]
    pub datetime_format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            file_log_level: None,
            disable_file_logging: false,
            disable_file_log_date_based: false,
            disable_log_color: false,
            filename_log: default_filename_log(),
            logs_path: default_logs_path(),
            datetime_format: default_logs_datetime_format(),
        }
    }
}

/// Install the global logger and route panics into it.
/// Can only succeed once per process.
pub fn setup_logger(config: &LogConfig) -> Result<(), LoggerError> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta);

    let console_level: LevelFilter = config.log_level.into();
    let datetime_format = config.datetime_format.clone();
    let disable_colors = config.disable_log_color;
    let console = fern::Dispatch::new()
        .level(console_level)
        .format(move |out, message, record| {
            let time = chrono::Local::now().format(&datetime_format);
            if disable_colors {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    time,
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    time,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new().chain(console);
    let mut max_level = console_level;

    if !config.disable_file_logging {
        let file_level: LevelFilter = config.file_log_level.unwrap_or(config.log_level).into();
        max_level = max_level.max(file_level);

        let logs_path = Path::new(&config.logs_path);
        fs::create_dir_all(logs_path).map_err(LoggerError::Directory)?;

        let datetime_format = config.datetime_format.clone();
        let file = fern::Dispatch::new()
            .level(file_level)
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    chrono::Local::now().format(&datetime_format),
                    record.level(),
                    record.target(),
                    message
                ))
            });

        let file = if config.disable_file_log_date_based {
            let output = fern::log_file(logs_path.join(&config.filename_log))
                .map_err(LoggerError::File)?;
            file.chain(output)
        } else {
            file.chain(fern::DateBased::new(
                logs_path,
                format!("%Y-%m-%d.{}", config.filename_log),
            ))
        };
        dispatch = dispatch.chain(file);
    }

    dispatch.level(max_level).apply()?;
    log_panics::init();
    Ok(())
}
