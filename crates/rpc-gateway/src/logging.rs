//! Wiring between the gateway log settings and the `tracing` subscriber.

use tracing::level_filters::LevelFilter;

use crate::config::{LogConfig, LogLevel};

/// Connection open/close lines.
pub const CHANNEL_CONNECT: u32 = 1 << 0;
/// Control frames (ping/pong/close).
pub const CHANNEL_CONTROL: u32 = 1 << 1;
/// Full frame payloads on send and receive.
pub const CHANNEL_FRAME_PAYLOAD: u32 = 1 << 2;
/// All transport channels.
pub const CHANNEL_ALL: u32 = CHANNEL_CONNECT | CHANNEL_CONTROL | CHANNEL_FRAME_PAYLOAD;

/// Map a gateway log level onto a `tracing` filter.
///
/// `tracing` has no Notice level; it shares the Info filter.
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Notice | LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
    }
}

/// Resolve the effective transport channel mask from the configured
/// include/exclude masks.
///
/// Defaults mirror a freshly configured transport: everything included,
/// frame payloads and control frames excluded.
pub fn effective_channels(include: Option<u32>, exclude: Option<u32>) -> u32 {
    let include = include.unwrap_or(CHANNEL_ALL);
    let exclude = exclude.unwrap_or(CHANNEL_FRAME_PAYLOAD | CHANNEL_CONTROL);
    include & !exclude
}

/// Install a global subscriber honouring the configured level and format.
///
/// The first installation wins for the lifetime of the process; repeated
/// calls (reconnects, multiple gateways) are no-ops.
pub fn init(config: &LogConfig) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level_filter(config.level))
        .with_file(config.format.location)
        .with_line_number(config.format.location)
        .with_target(config.format.function)
        .with_thread_ids(config.format.thread);

    let installed = if config.format.ts {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    if installed.is_err() {
        tracing::debug!("log subscriber already installed; keeping existing settings");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_filter(LogLevel::Error), LevelFilter::ERROR);
        assert_eq!(level_filter(LogLevel::Warning), LevelFilter::WARN);
        assert_eq!(level_filter(LogLevel::Notice), LevelFilter::INFO);
        assert_eq!(level_filter(LogLevel::Info), LevelFilter::INFO);
        assert_eq!(level_filter(LogLevel::Debug), LevelFilter::DEBUG);
    }

    #[test]
    fn test_default_channels() {
        assert_eq!(effective_channels(None, None), CHANNEL_CONNECT);
    }

    #[test]
    fn test_explicit_masks() {
        assert_eq!(effective_channels(Some(CHANNEL_ALL), Some(0)), CHANNEL_ALL);
        assert_eq!(
            effective_channels(Some(CHANNEL_FRAME_PAYLOAD | CHANNEL_CONNECT), Some(CHANNEL_CONNECT)),
            CHANNEL_FRAME_PAYLOAD
        );
        assert_eq!(effective_channels(Some(0), None), 0);
    }
}
