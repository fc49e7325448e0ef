use std::io::Write;

use env_logger::Env;
use log::LevelFilter;

/// Initialize the process logger.
///
/// Format: `2025-12-29 10:30:45.123 INFO [main.rs:34] [phonelink] message`,
/// with per-level colors. `RUST_LOG` overrides the default level; setting
/// `PHONELINK_DEV` raises the default from info to debug.
pub fn init() {
    let default_level = if std::env::var("PHONELINK_DEV").is_ok() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::from_env(
        Env::default().default_filter_or(default_level.to_string()),
    );
    builder.format(|out, record| {
        let level_color = match record.level() {
            log::Level::Error => "\x1b[31;1m",
            log::Level::Warn => "\x1b[33m",
            log::Level::Info => "\x1b[32m",
            log::Level::Debug => "\x1b[34m",
            log::Level::Trace => "\x1b[36m",
        };
        let reset = "\x1b[0m";

        let file = record.file().unwrap_or("unknown");
        let line = record.line().unwrap_or(0);

        writeln!(
            out,
            "{} {}{} [{}:{}] [{}] {}{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level_color,
            record.level(),
            file,
            line,
            record.target(),
            record.args(),
            reset
        )
    });

    // Tests and embedders may have installed a logger already.
    let _ = builder.try_init();
}
