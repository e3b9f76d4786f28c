//! Global `tracing` subscriber setup shared by the intakekit crates.
//!
//! `RUST_LOG` always wins over the configured level. Installing twice is an
//! error rather than a silent no-op.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Level used when neither the config nor `RUST_LOG` says otherwise.
pub const C_LOG_LEVEL_DEFAULT: &str = "info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumLogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl EnumLogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for EnumLogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnumLogFormat {
    type Err = LogInitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(LogInitError::UnknownFormat(s.to_string())),
        }
    }
}

/// `[log]` section of the intakekit config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecLogConfig {
    /// `EnvFilter` directive, e.g. `info` or `intakekit_io_import=debug`.
    pub level: String,
    pub format: EnumLogFormat,
}

impl Default for SpecLogConfig {
    fn default() -> Self {
        Self {
            level: C_LOG_LEVEL_DEFAULT.to_string(),
            format: EnumLogFormat::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("unknown log format `{0}` (expected `pretty` or `json`)")]
    UnknownFormat(String),
    #[error("invalid log level `{level}`")]
    InvalidLevel {
        level: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Filter from `RUST_LOG` when set and valid, else from `level`.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, LogInitError> {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return Ok(env_filter);
    }
    EnvFilter::try_new(level).map_err(|e| LogInitError::InvalidLevel {
        level: level.to_string(),
        source: e,
    })
}

/// Install the global subscriber described by `spec_log`.
///
/// # Errors
///
/// Fails when the level does not parse or a global subscriber is already set.
pub fn init_logging(spec_log: &SpecLogConfig) -> Result<(), LogInitError> {
    let env_filter = build_env_filter(&spec_log.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false);

    let res_install = match spec_log.format {
        EnumLogFormat::Json => builder.json().try_init(),
        EnumLogFormat::Pretty => builder.pretty().try_init(),
    };
    res_install.map_err(|e| LogInitError::Install(e.to_string()))?;

    tracing::debug!(
        level = %spec_log.level,
        format = %spec_log.format,
        "logging initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<EnumLogFormat>().expect("json"), EnumLogFormat::Json);
        assert_eq!(
            " pretty ".parse::<EnumLogFormat>().expect("pretty"),
            EnumLogFormat::Pretty
        );
        assert!(matches!(
            "xml".parse::<EnumLogFormat>(),
            Err(LogInitError::UnknownFormat(_))
        ));
    }

    #[test]
    fn log_section_deserializes_with_defaults() {
        let spec_log: SpecLogConfig = toml::from_str("format = \"json\"").expect("parse");
        assert_eq!(spec_log.level, "info");
        assert_eq!(spec_log.format, EnumLogFormat::Json);

        let spec_log: SpecLogConfig = toml::from_str("").expect("parse");
        assert_eq!(spec_log, SpecLogConfig::default());

        assert!(toml::from_str::<SpecLogConfig>("colour = true").is_err());
    }

    #[test]
    fn invalid_level_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(matches!(
            build_env_filter("intakekit=loud"),
            Err(LogInitError::InvalidLevel { .. })
        ));
    }

    #[test]
    fn second_install_fails() {
        let spec_log = SpecLogConfig::default();
        let _ = init_logging(&spec_log);
        assert!(matches!(
            init_logging(&spec_log),
            Err(LogInitError::Install(_))
        ));
    }
}
