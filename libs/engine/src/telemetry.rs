//! Stderr logging setup (§4.I), initialised once at startup from `--log-level`.

use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Error, Debug)]
pub enum Error {
    #[error("unrecognized log level \"{0}\"")]
    InvalidLevel(String),

    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobalDefault(#[source] tracing::subscriber::SetGlobalDefaultError),
}

/// Specifies the format of log output, either JSON or plain text.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// Map the source system's level names onto `tracing::Level`; `panic`/`fatal` collapse to
/// `error` since `tracing` has no equivalent of its own.
fn normalize_level(level: &str) -> Result<&'static str, Error> {
    match level {
        "panic" | "fatal" | "error" => Ok("error"),
        "warn" => Ok("warn"),
        "info" => Ok("info"),
        "debug" => Ok("debug"),
        other => Err(Error::InvalidLevel(other.to_string())),
    }
}

/// Install the process-wide tracing subscriber. Must run before any other module emits events.
pub fn init(log_level: &str, log_format: LogFormat) -> Result<(), Error> {
    let level = normalize_level(log_level)?;
    let filter = EnvFilter::new(level);

    let fmt_layer = match log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    let collector = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(collector).map_err(Error::SetGlobalDefault)
}
