use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::actors::poller::DEFAULT_INTERVAL_SECS;

const POLL_INTERVAL: &str = "POLL_INTERVAL";

const NETPULSE_LOG: &str = "NETPULSE_LOG";

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::TRACE;

/// Poll interval from the environment, `None` when unset or unparsable
pub fn get_poll_interval() -> Option<u64> {
    parse_poll_interval(std::env::var(POLL_INTERVAL).ok().as_deref())
}

pub fn parse_poll_interval(raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim();
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!("ignoring invalid {POLL_INTERVAL} value {raw:?}");
            None
        }
    }
}

/// Command line beats environment beats config file beats the default
pub fn resolve_interval(cli: Option<u64>, env: Option<u64>, config: Option<u64>) -> u64 {
    cli.filter(|secs| *secs > 0)
        .or(env)
        .or(config.filter(|secs| *secs > 0))
        .unwrap_or(DEFAULT_INTERVAL_SECS)
}

pub fn get_log_level() -> LevelFilter {
    std::env::var(NETPULSE_LOG).map_or(DEFAULT_LOG_LEVEL, |level| {
        level.parse().unwrap_or(DEFAULT_LOG_LEVEL)
    })
}
