//! Aggregate-metric composition (§4.2): when a gauge's source value is
//! spread across several doc-values fields that share one output name —
//! e.g. a previously-downsampled gauge stored as `field.min`, `field.max`,
//! `field.sum`, `field.value_count` — each sub-field gets its own
//! [`GaugeProducer`] slot, and `CompositeProducer` merges their outputs into
//! a single `{min, max, sum, value_count}` object at serialization time.
//!
//! Each slot still gets exactly one `collect()` call per document, fed from
//! its own doc-values accessor, matching the one-field-per-`collect`-call
//! contract every other producer variant follows.

use crate::field_producer::gauge::GaugeProducer;
use crate::model::{DocValue, Document};

#[derive(Clone, Debug, Default)]
pub struct CompositeProducer {
    subs: Vec<GaugeProducer>,
}

impl CompositeProducer {
    pub fn new(sub_count: usize) -> Self {
        Self {
            subs: (0..sub_count).map(|_| GaugeProducer::new()).collect(),
        }
    }

    pub fn sub_mut(&mut self, index: usize) -> &mut GaugeProducer {
        &mut self.subs[index]
    }

    pub fn reset(&mut self) {
        for sub in &mut self.subs {
            sub.reset();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subs.iter().all(GaugeProducer::is_empty)
    }

    pub fn to_doc_value(&self) -> Option<DocValue> {
        let mut merged = GaugeProducer::new();
        for sub in &self.subs {
            merged.merge_from(sub);
        }
        merged.to_doc_value()
    }

    pub fn write(&self, doc: &mut Document, field_name: &str) {
        if let Some(v) = self.to_doc_value() {
            doc.insert(field_name.to_string(), v);
        }
    }
}
