use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Environment variable whose directives, when set, replace [`LoggerConfig::level`].
pub const LOG_ENV: &str = "GETO_LOG";

/// Installs the global subscriber described by `cfg`. Fails if one is already installed.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let directives = directives(cfg, std::env::var(LOG_ENV).ok());
    let filter = mk_filter(&directives)?;

    match cfg.format {
        LoggerFormat::Text => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(cfg.use_color)
                .with_target(cfg.with_targets)
                .with_timer(mk_timer());
            init_with(tracing_subscriber::registry().with(filter).with(layer))
        }
        LoggerFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(cfg.with_targets)
                .with_current_span(true)
                .with_timer(mk_timer());
            init_with(tracing_subscriber::registry().with(filter).with(layer))
        }
        LoggerFormat::Journald => mk_journald(filter),
    }
}

fn directives(cfg: &LoggerConfig, env: Option<String>) -> String {
    env.filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| cfg.level.clone())
}

fn mk_filter(directives: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directives)
        .map_err(|e| LoggerError::InvalidLogLevel(format!("{directives:?}: {e}")))
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn init_with<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let msg = e.to_string();
        if msg.contains("already") {
            LoggerError::AlreadyInitialized
        } else {
            LoggerError::InitializationFailed(msg)
        }
    })
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn mk_journald(filter: EnvFilter) -> Result<(), LoggerError> {
    let journald = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("geto".to_string());
    init_with(tracing_subscriber::registry().with(filter).with(journald))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn mk_journald(_filter: EnvFilter) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directives_override_configured_level() {
        let cfg = LoggerConfig::new(LoggerFormat::Text, "info");
        assert_eq!(directives(&cfg, None), "info");
        assert_eq!(directives(&cfg, Some("  ".into())), "info");
        assert_eq!(
            directives(&cfg, Some("geto_core=trace".into())),
            "geto_core=trace"
        );
    }

    #[test]
    fn filter_accepts_target_directives() {
        assert!(mk_filter("warn,geto_core=debug").is_ok());
        assert!(matches!(
            mk_filter("geto_core=loud"),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn second_init_reports_already_initialized() {
        let cfg = LoggerConfig::new(LoggerFormat::Text, "off").with_color(false);
        assert!(logger_init(&cfg).is_ok());
        assert!(matches!(
            logger_init(&cfg),
            Err(LoggerError::AlreadyInitialized)
        ));
    }
}
