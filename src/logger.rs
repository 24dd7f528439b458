//! Log output: `YYYY-MM-DD HH:MM LEVEL message`

use chrono::{DateTime, Local, TimeZone};
use colored::Colorize;
use log::{Level, LevelFilter};
use std::io::Write;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Level for the given flags; `RUST_LOG` still wins when set
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 | 1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(verbose: u8, quiet: bool) {
    env_logger::Builder::new()
        .filter_level(level_for(verbose, quiet))
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}",
                format_line(&Local::now(), record.level(), &record.args().to_string())
            )
        })
        .init();
}

pub fn format_line<Tz: TimeZone>(at: &DateTime<Tz>, level: Level, message: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let label = match level {
        Level::Error => level.as_str().red(),
        Level::Warn => level.as_str().yellow(),
        Level::Info => level.as_str().green(),
        Level::Debug | Level::Trace => level.as_str().dimmed(),
    };
    format!("{} {label} {message}", at.format(TIMESTAMP_FORMAT))
}
