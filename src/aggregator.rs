use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use crate::config::Config;
use crate::keying::{key_sample, Keyed, NameMapper};
use crate::sample::{MetricType, Sample};

#[derive(Clone, Debug)]
pub struct GaugeEntry {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: HashMap<String, f64>,
    pub expires_at: Option<Instant>,
}

#[derive(Clone, Debug)]
pub struct CounterEntry {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: HashMap<String, i64>,
    pub expires_at: Option<Instant>,
}

#[derive(Clone, Debug)]
pub struct SetEntry {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: HashMap<String, HashSet<String>>,
    pub expires_at: Option<Instant>,
}

#[derive(Clone, Debug)]
pub struct TimingEntry {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: HashMap<String, crate::stats::RunningStats>,
    pub expires_at: Option<Instant>,
}

#[derive(Clone, Debug)]
pub struct DistributionPoint {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub value: f64,
}

/// The mutable aggregation state. All access goes through the single mutex
/// held by `Aggregator`; per-key independence means a sharded
/// implementation would observe the same semantics.
#[derive(Default)]
struct Caches {
    gauges: HashMap<String, GaugeEntry>,
    counters: HashMap<String, CounterEntry>,
    sets: HashMap<String, SetEntry>,
    timings: HashMap<String, TimingEntry>,
    distributions: Vec<DistributionPoint>,
}

pub struct Aggregator {
    caches: Mutex<Caches>,
    mapper: Box<dyn NameMapper>,
    config: Config,
}

impl Aggregator {
    pub fn new(config: Config, mapper: Box<dyn NameMapper>) -> Self {
        Self {
            caches: Mutex::new(Caches::default()),
            mapper,
            config,
        }
    }

    /// Applies one parsed sample to the appropriate per-type cache. Name
    /// keying happens outside the lock: the mapper is a pure function of
    /// its inputs, so nothing here needs the aggregation mutex held while
    /// it runs.
    pub fn apply(&self, sample: &Sample, now: Instant) {
        let keyed = key_sample(
            sample,
            self.mapper.as_ref(),
            self.config.sanitize_names_method,
            self.config.convert_names,
        );
        let hash = keyed.hash();
        let expires_at = self.config.max_ttl().map(|ttl| now + ttl);

        let mut caches = self.caches.lock().expect("aggregation mutex poisoned");
        match sample.mtype {
            MetricType::Counter => apply_counter(&mut caches, sample, &keyed, hash, expires_at, &self.config),
            MetricType::Gauge => apply_gauge(&mut caches, sample, &keyed, hash, expires_at),
            MetricType::Set => apply_set(&mut caches, sample, &keyed, hash, expires_at),
            MetricType::Timing | MetricType::Histogram => {
                apply_timing(&mut caches, sample, &keyed, hash, expires_at, self.config.percentile_limit)
            }
            MetricType::Distribution => {
                if self.config.datadog_extensions && self.config.datadog_distributions {
                    apply_distribution(&mut caches, sample, &keyed);
                }
            }
        }
    }

    pub(crate) fn with_caches<R>(&self, f: impl FnOnce(&mut CachesView) -> R) -> R {
        let mut caches = self.caches.lock().expect("aggregation mutex poisoned");
        let mut view = CachesView { caches: &mut caches };
        f(&mut view)
    }
}

fn metric_type_tag(tags: &mut BTreeMap<String, String>, value: &'static str) {
    tags.insert("metric_type".to_string(), value.to_string());
}

fn apply_counter(
    caches: &mut Caches,
    sample: &Sample,
    keyed: &Keyed,
    hash: String,
    expires_at: Option<Instant>,
    config: &Config,
) {
    let Some(mut value) = sample.int_value() else {
        return;
    };
    if sample.sample_rate > 0.0 {
        value = (value as f64 / sample.sample_rate).round() as i64;
    }

    let entry = caches.counters.entry(hash).or_insert_with(|| {
        let mut tags = keyed.tags.clone();
        metric_type_tag(&mut tags, "counter");
        if config.enable_aggregation_temporality {
            let temporality = if config.delete_counters {
                "delta"
            } else {
                "cumulative"
            };
            tags.insert("temporality".to_string(), temporality.to_string());
        }
        CounterEntry {
            name: keyed.name.clone(),
            tags,
            fields: HashMap::new(),
            expires_at,
        }
    });
    entry.expires_at = expires_at;
    *entry.fields.entry(keyed.field.clone()).or_insert(0) += value;
}

fn apply_gauge(caches: &mut Caches, sample: &Sample, keyed: &Keyed, hash: String, expires_at: Option<Instant>) {
    let Some(value) = sample.float_value() else {
        return;
    };
    let entry = caches.gauges.entry(hash).or_insert_with(|| {
        let mut tags = keyed.tags.clone();
        metric_type_tag(&mut tags, "gauge");
        GaugeEntry {
            name: keyed.name.clone(),
            tags,
            fields: HashMap::new(),
            expires_at,
        }
    });
    entry.expires_at = expires_at;
    if sample.additive {
        *entry.fields.entry(keyed.field.clone()).or_insert(0.0) += value;
    } else {
        entry.fields.insert(keyed.field.clone(), value);
    }
}

fn apply_set(caches: &mut Caches, sample: &Sample, keyed: &Keyed, hash: String, expires_at: Option<Instant>) {
    let Some(value) = sample.str_value() else {
        return;
    };
    let entry = caches.sets.entry(hash).or_insert_with(|| {
        let mut tags = keyed.tags.clone();
        metric_type_tag(&mut tags, "set");
        SetEntry {
            name: keyed.name.clone(),
            tags,
            fields: HashMap::new(),
            expires_at,
        }
    });
    entry.expires_at = expires_at;
    entry
        .fields
        .entry(keyed.field.clone())
        .or_default()
        .insert(value.to_string());
}

fn apply_timing(
    caches: &mut Caches,
    sample: &Sample,
    keyed: &Keyed,
    hash: String,
    expires_at: Option<Instant>,
    perc_limit: usize,
) {
    let Some(value) = sample.float_value() else {
        return;
    };
    let type_tag = if sample.mtype == MetricType::Histogram {
        "histogram"
    } else {
        "timing"
    };
    let entry = caches.timings.entry(hash).or_insert_with(|| {
        let mut tags = keyed.tags.clone();
        metric_type_tag(&mut tags, type_tag);
        TimingEntry {
            name: keyed.name.clone(),
            tags,
            fields: HashMap::new(),
            expires_at,
        }
    });
    entry.expires_at = expires_at;
    let stats = entry
        .fields
        .entry(keyed.field.clone())
        .or_insert_with(|| crate::stats::RunningStats::new(perc_limit));

    let repeats = if sample.sample_rate > 0.0 && sample.sample_rate < 1.0 {
        (1.0 / sample.sample_rate).floor() as u64
    } else {
        1
    };
    for _ in 0..repeats.max(1) {
        stats.add_value(value);
    }
}

fn apply_distribution(caches: &mut Caches, sample: &Sample, keyed: &Keyed) {
    let Some(value) = sample.float_value() else {
        return;
    };
    let mut tags = keyed.tags.clone();
    metric_type_tag(&mut tags, "distribution");
    caches.distributions.push(DistributionPoint {
        name: keyed.name.clone(),
        tags,
        value,
    });
}

/// A narrow, flush-only view over the caches, handed to `Flusher` so it
/// never needs to know about `Aggregator`'s internals beyond this.
pub struct CachesView<'a> {
    caches: &'a mut Caches,
}

impl<'a> CachesView<'a> {
    pub fn take_distributions(&mut self) -> Vec<DistributionPoint> {
        std::mem::take(&mut self.caches.distributions)
    }

    pub fn gauges(&mut self) -> &mut HashMap<String, GaugeEntry> {
        &mut self.caches.gauges
    }

    pub fn counters(&mut self) -> &mut HashMap<String, CounterEntry> {
        &mut self.caches.counters
    }

    pub fn sets(&mut self) -> &mut HashMap<String, SetEntry> {
        &mut self.caches.sets
    }

    pub fn timings(&mut self) -> &mut HashMap<String, TimingEntry> {
        &mut self.caches.timings
    }

    pub fn evict_expired(&mut self, now: Instant) {
        self.caches.gauges.retain(|_, e| !expired(e.expires_at, now));
        self.caches.counters.retain(|_, e| !expired(e.expires_at, now));
        self.caches.sets.retain(|_, e| !expired(e.expires_at, now));
        self.caches.timings.retain(|_, e| !expired(e.expires_at, now));
    }
}

fn expired(expires_at: Option<Instant>, now: Instant) -> bool {
    matches!(expires_at, Some(t) if t < now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keying::IdentityMapper;
    use crate::parser::{parse_line, ParsedLine, ParserOptions};
    use std::time::Duration;

    fn agg(config: Config) -> Aggregator {
        Aggregator::new(config, Box::new(IdentityMapper))
    }

    fn apply_line(a: &Aggregator, line: &str) {
        if let ParsedLine::Samples(samples) = parse_line(line, ParserOptions::default()).unwrap() {
            for s in samples {
                a.apply(&s, Instant::now());
            }
        }
    }

    #[test]
    fn counter_sample_rate_scales() {
        let a = agg(Config::default());
        apply_line(&a, "users.online:1|c|@0.5");
        a.with_caches(|c| {
            let entry = c.counters().values().next().unwrap();
            assert_eq!(*entry.fields.get("value").unwrap(), 2);
        });
    }

    #[test]
    fn gauge_additive_vs_replace() {
        let a = agg(Config::default());
        apply_line(&a, "load:42|g");
        apply_line(&a, "load:+5|g");
        apply_line(&a, "load:-10|g");
        a.with_caches(|c| {
            let entry = c.gauges().values().next().unwrap();
            assert_eq!(*entry.fields.get("value").unwrap(), 37.0);
        });
    }

    #[test]
    fn set_cardinality() {
        let a = agg(Config::default());
        for line in ["users:alice|s", "users:bob|s", "users:alice|s"] {
            apply_line(&a, line);
        }
        a.with_caches(|c| {
            let entry = c.sets().values().next().unwrap();
            assert_eq!(entry.fields.get("value").unwrap().len(), 2);
        });
    }

    #[test]
    fn distinct_tags_produce_distinct_entries() {
        let mut config = Config::default();
        config.datadog_extensions = true;
        let a = agg(config);
        apply_line(&a, "page.views,region=us,env=prod:1|c");
        apply_line(&a, "page.views:1|c|#region:eu");
        a.with_caches(|c| {
            assert_eq!(c.counters().len(), 2);
        });
    }

    #[test]
    fn ttl_eviction() {
        let mut config = Config::default();
        config.max_ttl_secs = 1;
        let a = agg(config);
        let past = Instant::now() - Duration::from_secs(10);
        if let ParsedLine::Samples(samples) = parse_line("load:1|g", ParserOptions::default()).unwrap() {
            for s in samples {
                a.apply(&s, past);
            }
        }
        a.with_caches(|c| c.evict_expired(Instant::now()));
        a.with_caches(|c| assert_eq!(c.gauges().len(), 0));
    }
}
