//! Holds the currently-accumulating bucket's state and serializes it to a
//! self-describing rollup document (§4.3).

use crate::field_producer::FieldProducer;
use crate::model::{DocId, DocValue, Document, Timestamp, TsId};

/// One source field's wiring into the producer array: its output name slot
/// index, plus (for composite gauge fields) which sub-slot a given
/// doc-values accessor feeds. `sub_index` is `0` for every non-composite
/// producer.
#[derive(Clone, Copy, Debug)]
pub struct FieldWiring {
    pub producer_index: usize,
    pub sub_index: usize,
}

/// Holds the currently-open bucket: the series it belongs to, the bucket
/// boundary, the running doc-count, and one accumulator per configured
/// field. Constructed once per shard run; `reset_series`/`reset_bucket`
/// reuse its allocations across bucket boundaries.
pub struct BucketBuilder {
    timestamp_field: String,
    tsid: Option<TsId>,
    tsid_ord: i64,
    bucket_start_ms: Timestamp,
    doc_count: u64,
    is_open: bool,
    producers: Vec<FieldProducer>,
}

impl BucketBuilder {
    /// `producers` must already be constructed per the field-producer
    /// grouping fixed at shard-run setup (§4.3: "grouping by name for
    /// aggregate-metric composition is fixed at construction").
    pub fn new(timestamp_field: impl Into<String>, producers: Vec<FieldProducer>) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
            tsid: None,
            tsid_ord: -1,
            bucket_start_ms: 0,
            doc_count: 0,
            is_open: false,
            producers,
        }
    }

    /// Begins a new bucket for a new series, deep-copying the tsid bytes
    /// because the iterator reuses its underlying buffer across documents
    /// (§9 "opaque byte-slice series ids").
    pub fn reset_series(&mut self, tsid: &TsId, tsid_ord: i64, bucket_start_ms: Timestamp) {
        self.tsid = Some(tsid.clone());
        self.tsid_ord = tsid_ord;
        self.bucket_start_ms = bucket_start_ms;
        self.doc_count = 0;
        self.is_open = true;
        for p in &mut self.producers {
            p.reset();
        }
    }

    /// Same series, new bucket: preserves `tsid`/`tsid_ord`.
    pub fn reset_bucket(&mut self, bucket_start_ms: Timestamp) {
        self.bucket_start_ms = bucket_start_ms;
        self.doc_count = 0;
        self.is_open = true;
        for p in &mut self.producers {
            p.reset();
        }
    }

    pub fn collect_doc_count(&mut self, n: u64) {
        self.doc_count += n;
    }

    pub fn collect_field(&mut self, wiring: FieldWiring, value: Option<&DocValue>, doc_id: DocId) {
        self.producers[wiring.producer_index].collect(wiring.sub_index, value, doc_id);
    }

    /// An open bucket is empty iff it has never been opened, or holds zero
    /// documents — an explicit flag rather than a sentinel timestamp, so a
    /// legitimate bucket at exactly the Unix epoch is never mistaken for
    /// "unset" (§9a).
    pub fn is_empty(&self) -> bool {
        !self.is_open || self.doc_count == 0
    }

    pub fn current_tsid(&self) -> Option<&TsId> {
        self.tsid.as_ref()
    }

    pub fn current_tsid_ord(&self) -> i64 {
        self.tsid_ord
    }

    pub fn current_bucket_start_ms(&self) -> Timestamp {
        self.bucket_start_ms
    }

    /// Emits the self-describing rollup document for the current bucket:
    /// the timestamp field, `_doc_count`, every dimension decoded from the
    /// tsid, and one field per producer (§6.2). Returns `None` for an
    /// empty bucket — the caller must not emit it (§4.3).
    pub fn serialize(&self, decode_dimensions: impl Fn(&TsId) -> Vec<(String, DocValue)>) -> Option<Document> {
        if self.is_empty() {
            return None;
        }
        let tsid = self.tsid.as_ref()?;
        let mut doc = Document::new();
        doc.insert(
            self.timestamp_field.clone(),
            DocValue::I64(self.bucket_start_ms),
        );
        doc.insert(
            crate::model::DOC_COUNT_FIELD.to_string(),
            DocValue::I64(self.doc_count as i64),
        );
        for (name, value) in decode_dimensions(tsid) {
            doc.insert(name, value);
        }
        for p in &self.producers {
            p.write(&mut doc);
        }
        Some(doc)
    }
}
