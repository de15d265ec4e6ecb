use std::collections::BTreeMap;

/// Field value as emitted to the sink: counters/sets may be integer or
/// float depending on configuration, gauges and timing percentiles are
/// always float.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

pub type Tags = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, FieldValue>;

/// Abstract downstream consumer. The real accumulator this crate feeds is
/// an external collaborator; this trait is the seam it plugs into.
pub trait Sink: Send {
    fn add_fields(&mut self, name: &str, fields: Fields, tags: Tags);
    fn add_gauge(&mut self, name: &str, fields: Fields, tags: Tags);
    fn add_counter(&mut self, name: &str, fields: Fields, tags: Tags);
}

/// An in-memory `Sink` used by tests and the demo binary: records every
/// call so assertions can inspect exactly what a flush produced.
#[derive(Default)]
pub struct RecordingSink {
    pub fields: Vec<(String, Fields, Tags)>,
    pub gauges: Vec<(String, Fields, Tags)>,
    pub counters: Vec<(String, Fields, Tags)>,
}

impl Sink for RecordingSink {
    fn add_fields(&mut self, name: &str, fields: Fields, tags: Tags) {
        self.fields.push((name.to_string(), fields, tags));
    }

    fn add_gauge(&mut self, name: &str, fields: Fields, tags: Tags) {
        self.gauges.push((name.to_string(), fields, tags));
    }

    fn add_counter(&mut self, name: &str, fields: Fields, tags: Tags) {
        self.counters.push((name.to_string(), fields, tags));
    }
}

/// A `Sink` that prints each call as a line, for the standalone binary.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn add_fields(&mut self, name: &str, fields: Fields, tags: Tags) {
        println!("distribution/timing {name} {fields:?} {tags:?}");
    }

    fn add_gauge(&mut self, name: &str, fields: Fields, tags: Tags) {
        println!("gauge {name} {fields:?} {tags:?}");
    }

    fn add_counter(&mut self, name: &str, fields: Fields, tags: Tags) {
        println!("counter {name} {fields:?} {tags:?}");
    }
}
