//! Logging bootstrap.
//!
//! - Text or JSON output, RFC3339 (UTC) timestamps
//! - EnvFilter from an explicit directive or RUST_LOG, falling back to "info"

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::TelemetrySettings;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info,tiered_sale=debug"); `None` reads RUST_LOG.
    pub env_filter: Option<String>,
    pub json: bool,
    /// Print target, file and line number.
    pub with_targets_and_lines: bool,
    /// ANSI colours (text format only).
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            json: false,
            with_targets_and_lines: true,
            ansi: false,
        }
    }
}

impl From<&TelemetrySettings> for LoggingConfig {
    fn from(t: &TelemetrySettings) -> Self {
        Self {
            env_filter: Some(t.log_filter.clone()),
            json: t.json,
            ..Self::default()
        }
    }
}

/// Install the global subscriber. Call once at process start; a second call
/// returns an error instead of replacing the first subscriber.
pub fn init(cfg: LoggingConfig) -> anyhow::Result<()> {
    let filter = match &cfg.env_filter {
        Some(s) => EnvFilter::try_new(s.as_str()).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let base = fmt::layer()
        .with_target(cfg.with_targets_and_lines)
        .with_file(cfg.with_targets_and_lines)
        .with_line_number(cfg.with_targets_and_lines)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let registry = Registry::default().with(filter);
    if cfg.json {
        registry
            .with(base.json().with_ansi(false).with_current_span(true).flatten_event(true))
            .try_init()?;
    } else {
        registry.with(base.with_ansi(cfg.ansi)).try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_text_then_reject_second_install() {
        let settings = TelemetrySettings { log_filter: "debug".into(), json: false };
        init(LoggingConfig::from(&settings)).expect("init");
        tracing::info!(target: "tiered_sale::test", "hello from test");
        assert!(init(LoggingConfig::default()).is_err());
    }
}
