use std::collections::BTreeMap;

use crate::config::SanitizeNamesMethod;
use crate::sample::Sample;

pub const DEFAULT_FIELD: &str = "value";

/// The identity derived for a sample once keying has run.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyed {
    pub name: String,
    pub field: String,
    pub tags: BTreeMap<String, String>,
}

impl Keyed {
    /// Deterministic cache key: sorted `k=v` tag pairs joined, then the
    /// name. `BTreeMap` already iterates in sorted key order, so ordering
    /// the tags the sample arrived with never affects the result.
    pub fn hash(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.tags {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push(',');
        }
        out.push_str(&self.name);
        out
    }
}

/// Pluggable Graphite-template name mapper. Consumes a bucket string (with
/// its inline tags already stripped) and may rewrite `(name, tags, field)`.
/// `field` is passed by mutable reference so a template-driven mapper can
/// actually assign it (e.g. extract a field name from the template rather
/// than always leaving the default). The real template-driven
/// implementation is an external collaborator; this crate only defines the
/// seam and a pass-through default.
pub trait NameMapper: Send + Sync {
    fn map(&self, name: &str, field: &mut String, tags: &mut BTreeMap<String, String>) -> Option<String>;
}

/// The default mapper: identity. Used when no template-driven mapper is
/// configured.
#[derive(Default)]
pub struct IdentityMapper;

impl NameMapper for IdentityMapper {
    fn map(&self, name: &str, _field: &mut String, _tags: &mut BTreeMap<String, String>) -> Option<String> {
        Some(name.to_string())
    }
}

/// Splits `bucket` on `,`, sanitizes the measurement name, delegates to the
/// configured `NameMapper`, and merges bucket-inline and line-level tags.
pub fn key_sample(
    sample: &Sample,
    mapper: &dyn NameMapper,
    sanitize: SanitizeNamesMethod,
    convert_names: bool,
) -> Keyed {
    let mut parts = sample.bucket.split(',');
    let mut name = parts.next().unwrap_or_default().to_string();
    let mut tags: BTreeMap<String, String> = BTreeMap::new();

    for inline in parts {
        let (k, v) = match inline.split_once('=') {
            // Extra '=' signs are preserved by rejoining everything after
            // the first split rather than dropping it.
            Some((k, rest)) => (k.to_string(), rest.to_string()),
            None => (String::new(), inline.to_string()),
        };
        tags.insert(k, v);
    }

    name = sanitize_name(&name, sanitize);

    let mut field = String::new();
    if let Some(mapped) = mapper.map(&name, &mut field, &mut tags) {
        name = mapped;
    }

    if convert_names {
        name = name.replace('.', "_").replace('-', "__");
    }

    for (k, v) in &sample.line_tags {
        tags.insert(k.clone(), v.clone());
    }

    if field.is_empty() {
        field = DEFAULT_FIELD.to_string();
    }

    Keyed { name, field, tags }
}

fn sanitize_name(name: &str, method: SanitizeNamesMethod) -> String {
    match method {
        SanitizeNamesMethod::None => name.to_string(),
        SanitizeNamesMethod::Upstream => {
            let collapsed: String = name
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_");
            let slashed = collapsed.replace('/', "-");
            slashed
                .chars()
                .filter(|c| {
                    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | ';' | '=')
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_line, ParsedLine, ParserOptions};

    fn sample(line: &str) -> Sample {
        match parse_line(line, ParserOptions::default()).unwrap() {
            ParsedLine::Samples(mut s) => s.remove(0),
            ParsedLine::Event(_) => panic!("expected sample"),
        }
    }

    #[test]
    fn default_field_is_value() {
        let k = key_sample(&sample("load:1|g"), &IdentityMapper, SanitizeNamesMethod::None, false);
        assert_eq!(k.field, "value");
        assert_eq!(k.name, "load");
    }

    #[test]
    fn inline_tags_parsed() {
        let k = key_sample(
            &sample("page.views,region=us,env=prod:1|c"),
            &IdentityMapper,
            SanitizeNamesMethod::None,
            false,
        );
        assert_eq!(k.tags.get("region").map(String::as_str), Some("us"));
        assert_eq!(k.tags.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn convert_names_rewrites_separators() {
        let k = key_sample(
            &sample("users.online-count:1|c"),
            &IdentityMapper,
            SanitizeNamesMethod::None,
            true,
        );
        assert_eq!(k.name, "users_online__count");
    }

    #[test]
    fn hash_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), "2".to_string());
        a.insert("a".to_string(), "1".to_string());
        let ka = Keyed {
            name: "m".into(),
            field: "value".into(),
            tags: a,
        };
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "1".to_string());
        b.insert("b".to_string(), "2".to_string());
        let kb = Keyed {
            name: "m".into(),
            field: "value".into(),
            tags: b,
        };
        assert_eq!(ka.hash(), kb.hash());
    }

    #[test]
    fn line_tags_override_bucket_tags() {
        let k = key_sample(
            &sample("page.views,region=us:1|c"),
            &IdentityMapper,
            SanitizeNamesMethod::None,
            false,
        );
        assert_eq!(k.tags.get("region").map(String::as_str), Some("us"));
    }
}
