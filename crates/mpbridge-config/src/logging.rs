use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::defaults::{DEFAULT_LOG_FILTER, default_log_format};

/// How log lines are rendered on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, including the active request span.
    #[default]
    Json,
    /// Single-line text for people reading a terminal.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Filter directive and output format shared by both binaries.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, for example `info,mpbridged::dispatch=debug`.
    pub filter: String,
    /// Output format for log lines.
    pub format: LogFormat,
}

impl LogSettings {
    /// Builds settings from a filter directive and a format.
    #[must_use]
    pub fn new(filter: impl Into<String>, format: LogFormat) -> Self {
        Self {
            filter: filter.into(),
            format,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_FILTER, default_log_format())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::json("json", LogFormat::Json)]
    #[case::compact("compact", LogFormat::Compact)]
    #[case::upper("COMPACT", LogFormat::Compact)]
    fn parses_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().expect("parse format"), expected);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn settings_fill_missing_fields_from_defaults() {
        let settings: LogSettings =
            serde_json::from_str(r#"{"format":"compact"}"#).expect("deserialise settings");
        assert_eq!(settings, LogSettings::new("info", LogFormat::Compact));
    }
}
