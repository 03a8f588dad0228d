//! Logging configuration: level, pretty-vs-JSON output, output stream, and
//! the `KONVAHTI_LOG_*` environment overlay. Mirrors
//! `internal/logging/config.go`, with `tracing`/`tracing-subscriber`
//! standing in for `zerolog`.

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::error::{KonvahtiError, Result};

const DEFAULT_TIMESTAMP_FIELD_NAME: &str = "timestamp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub enable_pretty_logging: bool,
    #[serde(default)]
    pub output_stream: String,
    #[serde(default)]
    pub timestamp_field_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: String::new(),
            enable_pretty_logging: false,
            output_stream: String::new(),
            timestamp_field_name: String::new(),
        }
    }
}

impl Config {
    /// Overlays `KONVAHTI_LOG_LEVEL`, `KONVAHTI_LOG_ENABLEPRETTYLOGGING`,
    /// `KONVAHTI_LOG_OUTPUTSTREAM`, and `KONVAHTI_LOG_TIMESTAMPFIELDNAME`
    /// on top of whatever the config file set, env winning when present.
    pub fn overlay_env_vars(mut self) -> Self {
        if let Ok(level) = std::env::var("KONVAHTI_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(pretty) = std::env::var("KONVAHTI_LOG_ENABLEPRETTYLOGGING") {
            self.enable_pretty_logging = pretty.eq_ignore_ascii_case("true");
        }
        if let Ok(stream) = std::env::var("KONVAHTI_LOG_OUTPUTSTREAM") {
            self.output_stream = stream;
        }
        if let Ok(field_name) = std::env::var("KONVAHTI_LOG_TIMESTAMPFIELDNAME") {
            self.timestamp_field_name = field_name;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.parse_level()?;
        match self.output_stream_name().as_str() {
            "STDOUT" | "STDERR" | "" => Ok(()),
            _ => Err(KonvahtiError::Config(format!(
                "invalid output stream {}",
                self.output_stream
            ))),
        }
    }

    /// `zerolog` has a few levels `tracing` doesn't (`fatal`, `panic`,
    /// `disabled`); they're mapped onto the closest `tracing` equivalent
    /// rather than rejected, so configs lifted from the original still
    /// validate.
    fn parse_level(&self) -> Result<LevelFilter> {
        match self.level.to_lowercase().as_str() {
            "" | "info" => Ok(LevelFilter::INFO),
            "trace" => Ok(LevelFilter::TRACE),
            "debug" => Ok(LevelFilter::DEBUG),
            "warn" => Ok(LevelFilter::WARN),
            "error" | "fatal" | "panic" => Ok(LevelFilter::ERROR),
            "disabled" => Ok(LevelFilter::OFF),
            other => Err(KonvahtiError::Config(format!("invalid log level {other}"))),
        }
    }

    fn output_stream_name(&self) -> String {
        self.output_stream.to_uppercase()
    }

    fn timestamp_field_name(&self) -> String {
        if self.timestamp_field_name.is_empty() {
            DEFAULT_TIMESTAMP_FIELD_NAME.to_string()
        } else {
            self.timestamp_field_name.clone()
        }
    }

    /// Installs the global `tracing` subscriber. Returns an error rather
    /// than panicking so the caller can decide how to report init failure.
    pub fn setup(&self) -> Result<()> {
        let level = self.parse_level()?;
        let filter = EnvFilter::new(level.to_string());

        let is_stdout = self.output_stream_name() == "STDOUT";

        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        let result = if self.enable_pretty_logging {
            if is_stdout {
                builder.with_writer(std::io::stdout).try_init()
            } else {
                builder.with_writer(std::io::stderr).try_init()
            }
        } else {
            let event_format = JsonEventFormat {
                timestamp_field_name: self.timestamp_field_name(),
            };
            let builder = builder.event_format(event_format);
            if is_stdout {
                builder.with_writer(std::io::stdout).try_init()
            } else {
                builder.with_writer(std::io::stderr).try_init()
            }
        };

        result.map_err(|e| KonvahtiError::Config(format!("failed to set up logging: {e}")))
    }
}

/// Renders one JSON object per event, under a caller-configurable key name
/// for the timestamp field. `tracing-subscriber`'s own JSON formatter
/// hardcodes that key to `timestamp`, which can't represent
/// `timestampFieldName` from the original `zerolog`-based configuration.
struct JsonEventFormat {
    timestamp_field_name: String,
}

impl<S, N> FormatEvent<S, N> for JsonEventFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        let mut fields = serde_json::Map::new();
        event.record(&mut JsonFieldVisitor(&mut fields));

        let mut object = serde_json::Map::new();
        object.insert(
            self.timestamp_field_name.clone(),
            serde_json::Value::String(humantime::format_rfc3339(std::time::SystemTime::now()).to_string()),
        );
        object.insert("level".into(), serde_json::Value::String(metadata.level().to_string()));
        object.insert("target".into(), serde_json::Value::String(metadata.target().to_string()));
        object.extend(fields);

        let line = serde_json::to_string(&object).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

struct JsonFieldVisitor<'a>(&'a mut serde_json::Map<String, serde_json::Value>);

impl Visit for JsonFieldVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn timestamp_field_name_falls_back_to_default() {
        assert_eq!(Config::default().timestamp_field_name(), "timestamp");
        let config = Config {
            timestamp_field_name: "ts".into(),
            ..Config::default()
        };
        assert_eq!(config.timestamp_field_name(), "ts");
    }

    #[test]
    fn invalid_level_fails_validation() {
        let config = Config {
            level: "not-a-level".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_output_stream_fails_validation() {
        let config = Config {
            output_stream: "FILE".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overlay_wins_over_file_config() {
        std::env::set_var("KONVAHTI_LOG_LEVEL", "debug");
        let config = Config::default().overlay_env_vars();
        assert_eq!(config.level, "debug");
        std::env::remove_var("KONVAHTI_LOG_LEVEL");
    }
}
