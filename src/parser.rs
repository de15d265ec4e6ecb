use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::Error;
use crate::sample::{MetricType, Sample, Value};

/// Options that affect how a line is tokenized. These are the parser-facing
/// subset of `Config`; kept separate so the parser can be exercised without
/// constructing a full `Config`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParserOptions {
    pub datadog_extensions: bool,
    pub datadog_keep_container_tag: bool,
}

/// The outcome of tokenizing one line: either zero-or-more samples, or an
/// event line handed off to the (out-of-scope) event handler.
pub enum ParsedLine {
    Samples(Vec<Sample>),
    Event(String),
}

/// Tokenizes a single trimmed StatsD/DogStatsD line.
pub fn parse_line(line: &str, opts: ParserOptions) -> Result<ParsedLine, Error> {
    let line = line.trim();
    if opts.datadog_extensions && line.starts_with("_e") {
        return Ok(ParsedLine::Event(line.to_string()));
    }

    let Some(colon) = line.find(':') else {
        return Err(parse_err(line, "missing ':' separating bucket from value"));
    };
    let bucket = &line[..colon];
    if bucket.is_empty() {
        return Err(parse_err(line, "empty bucket"));
    }

    // A line may pack multiple values for one bucket as
    // `bucket:v1:v2:v3|type|modifiers` — the type and modifiers are given
    // once and apply to every value. Splitting on '|' first, rather than
    // ':', keeps this unambiguous: the only place values can be packed is
    // the first pipe-segment, and everything after the first pipe (type,
    // modifiers) may itself contain colons (a DataDog tag `region:eu` or
    // container id `c:abc123`) without being mistaken for another value.
    let rest = &line[colon + 1..];
    let segments: Vec<&str> = rest.split('|').collect();
    if segments.len() < 2 {
        return Err(parse_err(line, "fewer than 2 pipe-segments"));
    }
    let mtype = MetricType::from_wire(segments[1])
        .ok_or_else(|| parse_err(line, format!("unknown metric type {:?}", segments[1])))?;

    let mut sample_rate = 1.0;
    let mut line_tags: BTreeMap<String, String> = BTreeMap::new();
    for modifier in &segments[2..] {
        if let Some(rate_str) = modifier.strip_prefix('@') {
            match rate_str.parse::<f64>() {
                Ok(r) if r > 0.0 => sample_rate = r,
                Ok(_) => { /* a 0 rate is "unspecified"; keep default 1.0 */ }
                Err(_) => {
                    warn!(modifier, "malformed sample rate, treating as unspecified");
                }
            }
        } else if opts.datadog_extensions && modifier.starts_with('#') {
            parse_tag_list(&modifier[1..], &mut line_tags);
        } else if opts.datadog_extensions
            && modifier.starts_with("c:")
            && opts.datadog_keep_container_tag
        {
            line_tags.insert("container".to_string(), modifier[2..].to_string());
        }
        // Unrecognized modifiers (or DataDog modifiers while extensions are
        // disabled) are ignored rather than rejected: the wire format is
        // forward-compatible by convention.
    }

    let raw_values: Vec<&str> = segments[0].split(':').collect();

    let mut samples = Vec::with_capacity(raw_values.len());
    for raw in raw_values {
        samples.push(parse_value(bucket, raw, mtype, sample_rate, &line_tags)?);
    }
    Ok(ParsedLine::Samples(samples))
}

fn parse_err(line: &str, reason: impl Into<String>) -> Error {
    let reason = reason.into();
    debug!(line, %reason, "statsd parse error");
    Error::Parse {
        line: line.to_string(),
        reason,
    }
}

fn parse_value(
    bucket: &str,
    raw: &str,
    mtype: MetricType,
    sample_rate: f64,
    line_tags: &BTreeMap<String, String>,
) -> Result<Sample, Error> {
    let additive_candidate = raw.starts_with('+') || raw.starts_with('-');
    if additive_candidate && !matches!(mtype, MetricType::Gauge | MetricType::Counter) {
        return Err(parse_err(
            raw,
            "leading +/- only valid for gauge and counter",
        ));
    }

    let value = match mtype {
        MetricType::Counter => Value::Int(parse_counter_value(raw)?),
        MetricType::Gauge
        | MetricType::Timing
        | MetricType::Histogram
        | MetricType::Distribution => Value::Float(
            raw.parse::<f64>()
                .map_err(|_| parse_err(raw, "not a valid float"))?,
        ),
        MetricType::Set => Value::Str(raw.to_string()),
    };

    Ok(Sample {
        bucket: bucket.to_string(),
        mtype,
        additive: additive_candidate,
        value,
        sample_rate,
        line_tags: line_tags.clone(),
    })
}

fn parse_counter_value(raw: &str) -> Result<i64, Error> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(i);
    }
    raw.parse::<f64>()
        .map(|f| f as i64)
        .map_err(|_| parse_err(raw, "not a valid counter value"))
}

fn parse_tag_list(tags: &str, out: &mut BTreeMap<String, String>) {
    for pair in tags.split(',') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once(':') {
            Some((k, v)) => out.insert(k.to_string(), v.to_string()),
            None => out.insert(pair.to_string(), String::new()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(line: &str, opts: ParserOptions) -> Vec<Sample> {
        match parse_line(line, opts).unwrap() {
            ParsedLine::Samples(s) => s,
            ParsedLine::Event(_) => panic!("expected samples"),
        }
    }

    #[test]
    fn basic_counter() {
        let s = samples("users.online:1|c", ParserOptions::default());
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].mtype, MetricType::Counter);
        assert_eq!(s[0].int_value(), Some(1));
    }

    #[test]
    fn sample_rate() {
        let s = samples("users.online:1|c|@0.5", ParserOptions::default());
        assert_eq!(s[0].sample_rate, 0.5);
    }

    #[test]
    fn malformed_sample_rate_is_unspecified_not_an_error() {
        let s = samples("users.online:1|c|@xyz", ParserOptions::default());
        assert_eq!(s[0].sample_rate, 1.0);
    }

    #[test]
    fn zero_sample_rate_is_unspecified() {
        let s = samples("users.online:1|c|@0", ParserOptions::default());
        assert_eq!(s[0].sample_rate, 1.0);
    }

    #[test]
    fn additive_gauge() {
        let s = samples("load:+5|g", ParserOptions::default());
        assert!(s[0].additive);
        assert_eq!(s[0].float_value(), Some(5.0));
        let s = samples("load:-10|g", ParserOptions::default());
        assert!(s[0].additive);
        assert_eq!(s[0].float_value(), Some(-10.0));
    }

    #[test]
    fn leading_sign_rejected_outside_gauge_counter() {
        assert!(parse_line("rt:-5|ms", ParserOptions::default()).is_err());
    }

    #[test]
    fn missing_colon_is_parse_error() {
        assert!(parse_line("no-colon-here", ParserOptions::default()).is_err());
    }

    #[test]
    fn too_few_pipe_segments_is_parse_error() {
        assert!(parse_line("x:1", ParserOptions::default()).is_err());
    }

    #[test]
    fn unknown_type_is_parse_error() {
        assert!(parse_line("x:1|zz", ParserOptions::default()).is_err());
    }

    #[test]
    fn multi_value_line_shares_bucket_type_and_modifiers() {
        let s = samples("x:1:2|c|@0.5", ParserOptions::default());
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].bucket, "x");
        assert_eq!(s[1].bucket, "x");
        assert_eq!(s[0].int_value(), Some(1));
        assert_eq!(s[1].int_value(), Some(2));
        assert_eq!(s[0].sample_rate, 0.5);
        assert_eq!(s[1].sample_rate, 0.5);
    }

    #[test]
    fn counter_falls_back_to_truncated_float() {
        let s = samples("x:1.9|c", ParserOptions::default());
        assert_eq!(s[0].int_value(), Some(1));
    }

    #[test]
    fn datadog_tags_parsed_when_enabled() {
        let opts = ParserOptions {
            datadog_extensions: true,
            datadog_keep_container_tag: false,
        };
        let s = samples("page.views:1|c|#region:eu,env", opts);
        assert_eq!(s[0].line_tags.get("region").map(String::as_str), Some("eu"));
        assert_eq!(s[0].line_tags.get("env").map(String::as_str), Some(""));
    }

    #[test]
    fn container_tag_only_kept_when_configured() {
        let opts = ParserOptions {
            datadog_extensions: true,
            datadog_keep_container_tag: true,
        };
        let s = samples("x:1|c|c:abc123", opts);
        assert_eq!(
            s[0].line_tags.get("container").map(String::as_str),
            Some("abc123")
        );

        let opts_no_keep = ParserOptions {
            datadog_extensions: true,
            datadog_keep_container_tag: false,
        };
        let s = samples("x:1|c|c:abc123", opts_no_keep);
        assert!(!s[0].line_tags.contains_key("container"));
    }

    #[test]
    fn datadog_tags_ignored_when_extensions_disabled() {
        let s = samples("x:1|c|#region:eu", ParserOptions::default());
        assert!(s[0].line_tags.is_empty());
    }

    #[test]
    fn event_line_routed_when_enabled() {
        let opts = ParserOptions {
            datadog_extensions: true,
            datadog_keep_container_tag: false,
        };
        match parse_line("_e{5,9}:title|text", opts).unwrap() {
            ParsedLine::Event(_) => {}
            ParsedLine::Samples(_) => panic!("expected event"),
        }
    }

    #[test]
    fn set_value_is_raw_string() {
        let s = samples("users:alice|s", ParserOptions::default());
        assert_eq!(s[0].str_value(), Some("alice"));
    }

    #[test]
    fn distribution_type() {
        let s = samples("x:1.5|d", ParserOptions::default());
        assert_eq!(s[0].mtype, MetricType::Distribution);
        assert_eq!(s[0].float_value(), Some(1.5));
    }
}
