//! Per-field accumulators driven one document at a time by the
//! [`crate::collector::Collector`] via the [`crate::bucket::BucketBuilder`]
//! (§4.2).
//!
//! Rearchitected per §9's design note as a single tagged union with a
//! match-based trait impl rather than a virtual-dispatch hierarchy — the
//! same shape the inherited codebase uses for its own numeric aggregator
//! variants (see `Aggregator` in the upstream `aggregators` module this
//! crate descends from).
//!
//! Doc-count has no variant here: §4.3 gives `BucketBuilder` its own
//! `collect_doc_count`/`doc_count` field, separate from `collect_field`, so
//! it's accumulated directly on the builder rather than through a producer.

pub mod composite;
pub mod counter;
pub mod gauge;
pub mod kahan;
pub mod label;

use composite::CompositeProducer;
use counter::CounterProducer;
use gauge::GaugeProducer;
use label::LabelProducer;

use crate::model::{DocId, DocValue, Document};

#[derive(Clone, Debug)]
pub enum FieldProducerKind {
    Gauge(GaugeProducer),
    Counter(CounterProducer),
    Label(LabelProducer),
    /// Holds `sub_count` independent gauge accumulators that get merged at
    /// `write` time into one `{min, max, sum, value_count}` object.
    Composite(CompositeProducer),
}

/// One output field's accumulator, paired with the name it serializes
/// under. Multiple slots may share a `name` only when all of them are
/// `Composite` sub-producers wired to the same field — grouping in that
/// case is fixed at [`crate::bucket::BucketBuilder`] construction time.
#[derive(Clone, Debug)]
pub struct FieldProducer {
    name: String,
    kind: FieldProducerKind,
}

impl FieldProducer {
    pub fn gauge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldProducerKind::Gauge(GaugeProducer::new()),
        }
    }

    pub fn counter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldProducerKind::Counter(CounterProducer::new()),
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldProducerKind::Label(LabelProducer::new()),
        }
    }

    pub fn composite(name: impl Into<String>, sub_count: usize) -> Self {
        Self {
            name: name.into(),
            kind: FieldProducerKind::Composite(CompositeProducer::new(sub_count)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `sub_index` is only meaningful for `Composite` producers (selects
    /// which of its gauge sub-slots this document's value feeds); every
    /// other variant ignores it.
    pub fn collect(&mut self, sub_index: usize, value: Option<&DocValue>, doc_id: DocId) {
        match &mut self.kind {
            FieldProducerKind::Gauge(g) => g.collect(value, doc_id),
            FieldProducerKind::Counter(c) => c.collect(value, doc_id),
            FieldProducerKind::Label(l) => l.collect(value, doc_id),
            FieldProducerKind::Composite(c) => c.sub_mut(sub_index).collect(value, doc_id),
        }
    }

    pub fn reset(&mut self) {
        match &mut self.kind {
            FieldProducerKind::Gauge(g) => g.reset(),
            FieldProducerKind::Counter(c) => c.reset(),
            FieldProducerKind::Label(l) => l.reset(),
            FieldProducerKind::Composite(c) => c.reset(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            FieldProducerKind::Gauge(g) => g.is_empty(),
            FieldProducerKind::Counter(c) => c.is_empty(),
            FieldProducerKind::Label(l) => l.is_empty(),
            FieldProducerKind::Composite(c) => c.is_empty(),
        }
    }

    pub fn write(&self, doc: &mut Document) {
        match &self.kind {
            FieldProducerKind::Gauge(g) => g.write(doc, &self.name),
            FieldProducerKind::Counter(c) => c.write(doc, &self.name),
            FieldProducerKind::Label(l) => l.write(doc, &self.name),
            FieldProducerKind::Composite(c) => c.write(doc, &self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_round_trips_through_enum_dispatch() {
        let mut p = FieldProducer::gauge("cpu");
        p.collect(0, Some(&DocValue::F64(3.0)), 0);
        p.collect(0, Some(&DocValue::F64(5.0)), 1);
        let mut doc = Document::new();
        p.write(&mut doc);
        let Some(DocValue::Object(obj)) = doc.get("cpu") else {
            panic!("expected object");
        };
        assert_eq!(obj.get("value_count"), Some(&DocValue::I64(2)));
    }

    #[test]
    fn counter_round_trips_through_enum_dispatch() {
        let mut p = FieldProducer::counter("requests_total");
        p.collect(0, Some(&DocValue::I64(180)), 0);
        p.collect(0, Some(&DocValue::I64(150)), 1);
        let mut doc = Document::new();
        p.write(&mut doc);
        assert_eq!(doc.get("requests_total"), Some(&DocValue::I64(180)));
    }

    #[test]
    fn label_round_trips_through_enum_dispatch() {
        let mut p = FieldProducer::label("host");
        p.collect(0, Some(&DocValue::String("z".into())), 0);
        let mut doc = Document::new();
        p.write(&mut doc);
        assert_eq!(doc.get("host"), Some(&DocValue::String("z".into())));
    }

    #[test]
    fn composite_routes_by_sub_index() {
        let mut p = FieldProducer::composite("cpu", 2);
        p.collect(0, Some(&DocValue::F64(1.0)), 0);
        p.collect(1, Some(&DocValue::F64(9.0)), 0);
        let mut doc = Document::new();
        p.write(&mut doc);
        let Some(DocValue::Object(obj)) = doc.get("cpu") else {
            panic!("expected object");
        };
        assert_eq!(obj.get("min"), Some(&DocValue::F64(1.0)));
        assert_eq!(obj.get("max"), Some(&DocValue::F64(9.0)));
    }

    #[test]
    fn reset_empties_producer_regardless_of_kind() {
        let mut p = FieldProducer::gauge("cpu");
        p.collect(0, Some(&DocValue::F64(1.0)), 0);
        p.reset();
        assert!(p.is_empty());
    }
}
