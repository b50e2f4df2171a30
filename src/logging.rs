use anyhow::{Context, Result, bail};
use std::fs::OpenOptions;

use crate::config::expand;

/// Map a configured level name to a filter (`fatal` is `error`)
pub fn parse_level(level: &str) -> Result<log::LevelFilter> {
    Ok(match level.to_ascii_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" | "fatal" => log::LevelFilter::Error,
        other => bail!("Invalid log level {other:?} (debug, info, warn, error, fatal)"),
    })
}

/// Level from the explicit setting, else from `-v` count
pub fn level_for(configured: Option<&str>, verbose: u8, quiet: bool) -> Result<log::LevelFilter> {
    if quiet {
        return Ok(log::LevelFilter::Error);
    }
    if let Some(level) = configured {
        return parse_level(level);
    }
    Ok(match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    })
}

/// Initialize logging to stdout or to the configured log file
pub fn init(level: log::LevelFilter, location: Option<&str>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);

    match location {
        None | Some("STDOUT" | "-") => {
            builder.target(env_logger::Target::Stdout);
        }
        Some(path) => {
            let path = expand(path);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Could not open log file {}", path.display()))?;
            builder
                .format_timestamp_secs()
                .target(env_logger::Target::Pipe(Box::new(file)));
        }
    }

    builder.try_init().context("Logger already initialized")
}
