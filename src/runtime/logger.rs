use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, or `default_directive` when it is unset.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| default_directive.into()))
}

/// Installs the global subscriber: an env filter and a fmt layer on stderr.
pub fn try_init(default_directive: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

/// Like [`try_init`], but a subscriber that is already installed is kept.
pub fn init(default_directive: &str) {
    if try_init(default_directive).is_err() {
        tracing::debug!("global subscriber already set");
    }
}

/// Emits one event per line of `text`, so multi-line output such as a
/// rendered table stays readable in the log.
pub fn log_lines(level: Level, text: &str) {
    for line in text.lines() {
        if level == Level::TRACE {
            tracing::trace!("{line}");
        } else if level == Level::DEBUG {
            tracing::debug!("{line}");
        } else if level == Level::INFO {
            tracing::info!("{line}");
        } else if level == Level::WARN {
            tracing::warn!("{line}");
        } else {
            tracing::error!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init("hummingbird=debug");
        init("hummingbird=info");
        assert!(try_init("hummingbird=info").is_err());
        log_lines(Level::INFO, "first\nsecond\r\nthird");
    }

    #[test]
    fn filter_falls_back_to_the_default_directive() {
        if std::env::var("RUST_LOG").is_err() {
            assert!(env_filter("hummingbird=warn").to_string().contains("hummingbird"));
        }
    }
}
