use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::sink::{FieldValue, Fields, Sink};

/// Drains the aggregator's caches into a `Sink` on each externally-driven
/// tick. Mirrors the ordering and delete-on-flush behavior described for
/// the aggregation core: distributions, then timings, then gauges, then
/// counters, then sets, then TTL eviction.
pub struct Flusher {
    config: Config,
}

impl Flusher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn gather(&self, aggregator: &Aggregator, sink: &mut dyn Sink, now: Instant) {
        let start_time = epoch_now();
        let cfg = &self.config;

        aggregator.with_caches(|caches| {
            for point in caches.take_distributions() {
                let mut fields: Fields = Fields::new();
                fields.insert("value".to_string(), FieldValue::Float(point.value));
                if cfg.enable_aggregation_temporality {
                    fields.insert("start_time".to_string(), FieldValue::Int(start_time));
                }
                sink.add_fields(&point.name, fields, point.tags);
            }

            for entry in caches.timings().values() {
                let mut fields: Fields = Fields::new();
                for (field_name, stats) in &entry.fields {
                    let prefix = if field_name == "value" {
                        String::new()
                    } else {
                        format!("{field_name}_")
                    };
                    fields.insert(format!("{prefix}mean"), FieldValue::Float(stats.mean()));
                    fields.insert(format!("{prefix}median"), FieldValue::Float(stats.median()));
                    fields.insert(format!("{prefix}stddev"), FieldValue::Float(stats.stddev()));
                    fields.insert(format!("{prefix}sum"), FieldValue::Float(stats.sum()));
                    fields.insert(format!("{prefix}upper"), FieldValue::Float(stats.upper()));
                    fields.insert(format!("{prefix}lower"), FieldValue::Float(stats.lower()));
                    let count = if cfg.float_timings {
                        FieldValue::Float(stats.count() as f64)
                    } else {
                        FieldValue::Int(stats.count() as i64)
                    };
                    fields.insert(format!("{prefix}count"), count);
                    for p in &cfg.percentiles {
                        fields.insert(
                            format!("{prefix}{}_percentile", trim_percentile(*p)),
                            FieldValue::Float(stats.percentile(*p)),
                        );
                    }
                }
                if cfg.enable_aggregation_temporality {
                    fields.insert("start_time".to_string(), FieldValue::Int(start_time));
                }
                sink.add_fields(&entry.name, fields, entry.tags.clone());
            }
            if cfg.delete_timings {
                caches.timings().clear();
            }

            for entry in caches.gauges().values() {
                let mut fields: Fields = entry
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), FieldValue::Float(*v)))
                    .collect();
                if cfg.enable_aggregation_temporality {
                    fields.insert("start_time".to_string(), FieldValue::Int(start_time));
                }
                sink.add_gauge(&entry.name, fields, entry.tags.clone());
            }
            if cfg.delete_gauges {
                caches.gauges().clear();
            }

            for entry in caches.counters().values() {
                let mut fields: Fields = entry
                    .fields
                    .iter()
                    .map(|(k, v)| {
                        let value = if cfg.float_counters {
                            FieldValue::Float(*v as f64)
                        } else {
                            FieldValue::Int(*v)
                        };
                        (k.clone(), value)
                    })
                    .collect();
                if cfg.enable_aggregation_temporality {
                    fields.insert("start_time".to_string(), FieldValue::Int(start_time));
                }
                sink.add_counter(&entry.name, fields, entry.tags.clone());
            }
            if cfg.delete_counters {
                caches.counters().clear();
            }

            for entry in caches.sets().values() {
                let fields: Fields = entry
                    .fields
                    .iter()
                    .map(|(k, v)| {
                        let card = v.len();
                        let value = if cfg.float_sets {
                            FieldValue::Float(card as f64)
                        } else {
                            FieldValue::Int(card as i64)
                        };
                        (k.clone(), value)
                    })
                    .collect();
                sink.add_fields(&entry.name, fields, entry.tags.clone());
            }
            if cfg.delete_sets {
                caches.sets().clear();
            }

            if cfg.max_ttl().is_some() {
                caches.evict_expired(now);
            }
        });
    }
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn trim_percentile(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("{}", p as i64)
    } else {
        format!("{p}")
    }
}
