//! Tracing setup for the server and the CLI.
//!
//! The server writes compact lines to stdout and mirrors them to a log file. `DOCRAG_LOG_FILE`
//! names an exact file to append to; otherwise `DOCRAG_LOG_DIR` (default `logs`) receives a
//! daily-rotated `docrag.log`. Setting `DOCRAG_LOG_FILE` to `off` disables the file copy.
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::OnceLock,
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "docrag.log";

/// Where the server's file copy of the logs goes.
#[derive(Debug, PartialEq, Eq)]
enum FileTarget {
    Disabled,
    Append(PathBuf),
    Daily(PathBuf),
}

fn resolve_file_target(log_file: Option<String>, log_dir: Option<String>) -> FileTarget {
    match log_file.map(|value| value.trim().to_string()) {
        Some(value) if value.eq_ignore_ascii_case("off") => FileTarget::Disabled,
        Some(value) if !value.is_empty() => FileTarget::Append(PathBuf::from(value)),
        _ => {
            let dir = log_dir
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());
            FileTarget::Daily(PathBuf::from(dir))
        }
    }
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the server subscriber: stdout plus the file copy when one can be opened.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let target = resolve_file_target(
        std::env::var("DOCRAG_LOG_FILE").ok(),
        std::env::var("DOCRAG_LOG_DIR").ok(),
    );
    let registry = tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().with_target(false).compact());

    match open_writer(&target) {
        Some(writer) => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
            .init(),
        None => registry.init(),
    }
}

/// Install a stderr-only subscriber for command-line use.
///
/// The CLI prints identifiers and answers on stdout, so diagnostics stay on stderr.
pub fn init_cli_tracing() {
    tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn open_writer(target: &FileTarget) -> Option<NonBlocking> {
    let (writer, guard) = match target {
        FileTarget::Disabled => return None,
        FileTarget::Append(path) => {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => tracing_appender::non_blocking(file),
                Err(err) => {
                    eprintln!("Failed to open log file {}: {err}", path.display());
                    return None;
                }
            }
        }
        FileTarget::Daily(dir) => {
            if let Err(err) = fs::create_dir_all(dir) {
                eprintln!("Failed to create log directory {}: {err}", dir.display());
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}
