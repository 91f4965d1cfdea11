//! Stderr logger for the `log` facade.
//!
//! Lines look like `[  1.234s  INFO session] message`: seconds since
//! installation, level, and the last path segment of the record target.
//! Records from outside the `marker_pose*` crates are capped at `Warn` so
//! image codecs and friends stay quiet at `debug`. Install it once at
//! startup with [`init_with_level`].

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt::format::FmtSpan, fmt::time::Uptime, util::SubscriberInitExt};

const OWN_TARGET_PREFIX: &str = "marker_pose";

struct StderrLogger {
    own: LevelFilter,
    foreign: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn new(own: LevelFilter) -> Self {
        Self {
            own,
            foreign: own.min(LevelFilter::Warn),
            started: Instant::now(),
        }
    }

    fn threshold(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_TARGET_PREFIX) {
            self.own
        } else {
            self.foreign
        }
    }
}

/// One formatted log line, without the trailing newline.
struct Line<'a> {
    elapsed_s: f64,
    level: Level,
    target: &'a str,
    args: &'a fmt::Arguments<'a>,
}

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.target.rsplit("::").next().unwrap_or(self.target);
        write!(
            f,
            "[{:7.3}s {:>5} {module}] {}",
            self.elapsed_s, self.level, self.args
        )
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.threshold(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Line {
            elapsed_s: self.started.elapsed().as_secs_f64(),
            level: record.level(),
            target: record.target(),
            args: record.args(),
        };
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger; `level` applies to the marker-pose crates.
///
/// The first call wins. Later calls leave the installed level untouched and
/// return `Ok(())`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger::new(level));
    log::set_logger(logger).map(|()| log::set_max_level(level))
}

/// Install a `tracing-subscriber` fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_filter`. With `json` set every event is a
/// flattened JSON object; span close events carry their busy/idle timings.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);
    let installed = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder.with_timer(Uptime::default()).finish().try_init()
    };
    if installed.is_err() {
        log::debug!("a tracing subscriber is already installed");
    }
}
