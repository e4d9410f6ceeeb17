use cw_core::config::{GeneralConfig, LogFormat};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging from the `[general]` config section.
///
/// Safe to call multiple times (e.g. in tests) -- subsequent calls are no-ops.
pub fn init_from_config(service_name: &str, general: &GeneralConfig) {
    match general.log_format {
        LogFormat::Pretty => init_logging(service_name, &general.log_level),
        LogFormat::Json => init_logging_json(service_name, &general.log_level),
    }
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Human-readable output on stderr, so command output on stdout stays clean.
pub fn init_logging(service_name: &str, default_level: &str) {
    fmt()
        .with_env_filter(filter(default_level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (human-readable)");
}

/// JSON lines on stderr, one object per event.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    fmt()
        .json()
        .with_env_filter(filter(default_level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(true)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (json)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_no_op() {
        let general = GeneralConfig::default();
        init_from_config("cw-test", &general);
        init_from_config("cw-test", &general);
        init_logging_json("cw-test", "debug");
    }
}
