use serde::Deserialize;

use crate::error::{ConfigSnafu, Error};

/// The transport the listener binds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl Protocol {
    /// Mirrors the upstream convention that any `"udp*"` string (e.g.
    /// `"udp4"`, `"udp6"`) selects UDP; anything else falls back to the
    /// explicit variant already parsed by serde.
    pub fn from_str_lenient(s: &str) -> Self {
        if s.to_ascii_lowercase().starts_with("udp") {
            Self::Udp
        } else {
            Self::Tcp
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeNamesMethod {
    #[serde(rename = "")]
    #[default]
    None,
    Upstream,
}

/// Configuration for the ingestion service. Corresponds to the option table
/// in the external interfaces section; the plugin-registration loader that
/// produces one of these from an operator-facing config file is out of
/// scope for this crate.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub protocol: Protocol,
    pub service_address: String,
    pub allowed_pending_messages: usize,
    pub number_worker_threads: usize,
    pub percentiles: Vec<f64>,
    pub percentile_limit: usize,

    pub delete_gauges: bool,
    pub delete_counters: bool,
    pub delete_sets: bool,
    pub delete_timings: bool,

    pub convert_names: bool,
    pub float_counters: bool,
    pub float_timings: bool,
    pub float_sets: bool,

    pub enable_aggregation_temporality: bool,
    pub metric_separator: String,

    pub datadog_extensions: bool,
    pub datadog_distributions: bool,
    pub datadog_keep_container_tag: bool,

    pub read_buffer_size: usize,
    pub sanitize_names_method: SanitizeNamesMethod,

    pub max_tcp_connections: usize,
    pub tcp_keep_alive: bool,
    pub tcp_keep_alive_period_secs: u64,

    pub max_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: Protocol::Udp,
            service_address: ":8125".to_string(),
            allowed_pending_messages: 10_000,
            number_worker_threads: 5,
            percentiles: vec![90.0],
            percentile_limit: 1000,
            delete_gauges: false,
            delete_counters: false,
            delete_sets: false,
            delete_timings: false,
            convert_names: false,
            float_counters: false,
            float_timings: false,
            float_sets: false,
            enable_aggregation_temporality: false,
            metric_separator: "_".to_string(),
            datadog_extensions: false,
            datadog_distributions: false,
            datadog_keep_container_tag: false,
            read_buffer_size: 0,
            sanitize_names_method: SanitizeNamesMethod::None,
            max_tcp_connections: 250,
            tcp_keep_alive: false,
            tcp_keep_alive_period_secs: 30,
            max_ttl_secs: 0,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        toml::from_str(s).map_err(|e| Error::Config {
            reason: e.to_string(),
        })
    }

    /// Rejects configuration combinations that can't be acted on at all,
    /// as opposed to the per-line "unknown sanitize method" case in
    /// `NameKeying`, which logs and falls through rather than failing
    /// startup.
    pub fn validate(&self) -> Result<(), Error> {
        if self.number_worker_threads == 0 {
            return ConfigSnafu {
                reason: "number_worker_threads must be at least 1",
            }
            .fail();
        }
        if self.allowed_pending_messages == 0 {
            return ConfigSnafu {
                reason: "allowed_pending_messages must be at least 1",
            }
            .fail();
        }
        for p in &self.percentiles {
            if !(0.0..=100.0).contains(p) {
                return ConfigSnafu {
                    reason: format!("percentile {p} out of range [0,100]"),
                }
                .fail();
            }
        }
        Ok(())
    }

    pub fn max_ttl(&self) -> Option<std::time::Duration> {
        if self.max_ttl_secs == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(self.max_ttl_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.service_address, ":8125");
        assert_eq!(cfg.allowed_pending_messages, 10_000);
        assert_eq!(cfg.number_worker_threads, 5);
        assert_eq!(cfg.percentile_limit, 1000);
        assert_eq!(cfg.max_tcp_connections, 250);
        assert_eq!(cfg.metric_separator, "_");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let mut cfg = Config::default();
        cfg.number_worker_threads = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_toml() {
        let cfg = Config::from_toml_str(
            r#"
            protocol = "tcp"
            service_address = "127.0.0.1:9125"
            convert_names = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.protocol, Protocol::Tcp);
        assert_eq!(cfg.service_address, "127.0.0.1:9125");
        assert!(cfg.convert_names);
    }
}
