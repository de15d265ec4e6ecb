use std::collections::BTreeMap;

/// One of the StatsD metric types, plus the DataDog distribution extension.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MetricType {
    Gauge,
    Counter,
    Set,
    Timing,
    Histogram,
    Distribution,
}

impl MetricType {
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "g" => Some(Self::Gauge),
            "c" => Some(Self::Counter),
            "s" => Some(Self::Set),
            "ms" => Some(Self::Timing),
            "h" => Some(Self::Histogram),
            "d" => Some(Self::Distribution),
            _ => None,
        }
    }

    /// The `metric_type` tag value injected by the aggregator.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
            Self::Set => "set",
            Self::Timing => "timing",
            Self::Histogram => "histogram",
            Self::Distribution => "distribution",
        }
    }
}

/// The value carried by a sample, discriminated by `mtype`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

/// A single parsed StatsD value, prior to name keying.
#[derive(Clone, Debug)]
pub struct Sample {
    pub bucket: String,
    pub mtype: MetricType,
    pub additive: bool,
    pub value: Value,
    pub sample_rate: f64,
    pub line_tags: BTreeMap<String, String>,
}

impl Sample {
    pub fn int_value(&self) -> Option<i64> {
        match &self.value {
            Value::Int(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            Value::Str(_) => None,
        }
    }

    pub fn float_value(&self) -> Option<f64> {
        match &self.value {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(_) => None,
        }
    }

    pub fn str_value(&self) -> Option<&str> {
        match &self.value {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }
}
