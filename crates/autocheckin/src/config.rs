//! Runtime configuration.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::planner::DEFAULT_CHECK_IN_LEAD_HOURS;

/// Longest accepted check-in lead (one week).
pub const MAX_CHECK_IN_LEAD_HOURS: i64 = 7 * 24;

/// Longest accepted delay between continuations (one week).
pub const MAX_CONTINUATION_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Log output style for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Identifier of the workflow the orchestrator runs (default: "local:autocheckin")
    pub state_machine_arn: String,
    /// Domain of the airline's own mail; senders there never get boarding passes (default: "southwest.com")
    pub airline_domain: String,
    /// Hours before departure that check-in opens (default: 24)
    pub check_in_lead_hours: i64,
    /// Delay before a continued run is re-invoked (default: 60s)
    pub continuation_interval: Duration,
    /// Continuations allowed per run before the orchestrator gives up (default: 16)
    pub max_continuations: u32,
    /// Log output style (default: pretty)
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_machine_arn: "local:autocheckin".to_string(),
            airline_domain: "southwest.com".to_string(),
            check_in_lead_hours: DEFAULT_CHECK_IN_LEAD_HOURS,
            continuation_interval: Duration::from_secs(60),
            max_continuations: 16,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// # Environment Variables
    /// - `AUTOCHECKIN_STATE_MACHINE_ARN` (falls back to `STATE_MACHINE_ARN`)
    /// - `AUTOCHECKIN_AIRLINE_DOMAIN`
    /// - `AUTOCHECKIN_CHECK_IN_LEAD_HOURS`
    /// - `AUTOCHECKIN_CONTINUATION_INTERVAL_SECS`
    /// - `AUTOCHECKIN_MAX_CONTINUATIONS`
    /// - `AUTOCHECKIN_LOG_FORMAT` - `pretty` or `json`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let state_machine_arn = lookup("AUTOCHECKIN_STATE_MACHINE_ARN")
            .or_else(|| lookup("STATE_MACHINE_ARN"))
            .unwrap_or(defaults.state_machine_arn);

        let airline_domain =
            lookup("AUTOCHECKIN_AIRLINE_DOMAIN").unwrap_or(defaults.airline_domain);

        let check_in_lead_hours = parse(
            &lookup,
            "AUTOCHECKIN_CHECK_IN_LEAD_HOURS",
            defaults.check_in_lead_hours,
        )?;
        if !(0..=MAX_CHECK_IN_LEAD_HOURS).contains(&check_in_lead_hours) {
            return Err(ConfigError::Invalid {
                var: "AUTOCHECKIN_CHECK_IN_LEAD_HOURS",
                reason: format!("must be between 0 and {MAX_CHECK_IN_LEAD_HOURS}"),
            });
        }

        let continuation_secs = parse(
            &lookup,
            "AUTOCHECKIN_CONTINUATION_INTERVAL_SECS",
            defaults.continuation_interval.as_secs(),
        )?;
        if continuation_secs > MAX_CONTINUATION_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                var: "AUTOCHECKIN_CONTINUATION_INTERVAL_SECS",
                reason: format!("must not exceed {MAX_CONTINUATION_INTERVAL_SECS}"),
            });
        }
        let continuation_interval = Duration::from_secs(continuation_secs);

        let max_continuations = parse(
            &lookup,
            "AUTOCHECKIN_MAX_CONTINUATIONS",
            defaults.max_continuations,
        )?;

        let log_format = match lookup("AUTOCHECKIN_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "AUTOCHECKIN_LOG_FORMAT",
                    reason: format!("expected pretty or json, got {other:?}"),
                })
            }
        };

        Ok(Self {
            state_machine_arn,
            airline_domain,
            check_in_lead_hours,
            continuation_interval,
            max_continuations,
            log_format,
        })
    }

    pub fn with_continuation_interval(mut self, interval: Duration) -> Self {
        self.continuation_interval = interval;
        self
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(Settings::from_lookup(lookup(&[])).unwrap(), Settings::default());
    }

    #[test]
    fn reads_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("STATE_MACHINE_ARN", "arn:aws:states:us-east-1:1:stateMachine:checkin"),
            ("AUTOCHECKIN_CONTINUATION_INTERVAL_SECS", "300"),
            ("AUTOCHECKIN_MAX_CONTINUATIONS", "4"),
            ("AUTOCHECKIN_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(
            settings.state_machine_arn,
            "arn:aws:states:us-east-1:1:stateMachine:checkin"
        );
        assert_eq!(settings.continuation_interval, Duration::from_secs(300));
        assert_eq!(settings.max_continuations, 4);
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Settings::from_lookup(lookup(&[("AUTOCHECKIN_MAX_CONTINUATIONS", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "AUTOCHECKIN_MAX_CONTINUATIONS",
                ..
            }
        ));
    }

    #[test]
    fn rejects_lead_beyond_a_week() {
        let err = Settings::from_lookup(lookup(&[(
            "AUTOCHECKIN_CHECK_IN_LEAD_HOURS",
            "1000000000000",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "AUTOCHECKIN_CHECK_IN_LEAD_HOURS",
                ..
            }
        ));

        let settings =
            Settings::from_lookup(lookup(&[("AUTOCHECKIN_CHECK_IN_LEAD_HOURS", "168")])).unwrap();
        assert_eq!(settings.check_in_lead_hours, MAX_CHECK_IN_LEAD_HOURS);
    }

    #[test]
    fn rejects_continuation_interval_beyond_a_week() {
        let err = Settings::from_lookup(lookup(&[(
            "AUTOCHECKIN_CONTINUATION_INTERVAL_SECS",
            "10000000000000",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "AUTOCHECKIN_CONTINUATION_INTERVAL_SECS",
                ..
            }
        ));
    }
}
