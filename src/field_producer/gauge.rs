//! Gauge metric accumulator: running `min`, `max`, compensated `sum`, and
//! `value_count` over one bucket's worth of numeric doc-values.

use crate::field_producer::kahan::KahanSum;
use crate::model::{DocId, DocValue, Document};

#[derive(Clone, Debug, Default)]
pub struct GaugeProducer {
    min: f64,
    max: f64,
    sum: KahanSum,
    value_count: u64,
}

impl GaugeProducer {
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: KahanSum::new(),
            value_count: 0,
        }
    }

    /// Consumes this document's contribution. A missing value (`None`) or a
    /// non-numeric value is skipped without advancing `value_count`, per
    /// §4.2's "missing values are skipped" rule. A nested `Object` value is
    /// treated as an already-aggregated sub-result (e.g. a second-level
    /// downsample of a previously downsampled gauge) and folded in via the
    /// same min/max/sum/count combination rule used for composite fields.
    pub fn collect(&mut self, value: Option<&DocValue>, _doc_id: DocId) {
        match value {
            None => {}
            Some(DocValue::Object(obj)) => self.collect_aggregate(obj),
            Some(v) => {
                if let Some(n) = v.as_f64() {
                    self.min = self.min.min(n);
                    self.max = self.max.max(n);
                    self.sum += n;
                    self.value_count += 1;
                }
            }
        }
    }

    fn collect_aggregate(&mut self, obj: &Document) {
        let min = obj.get("min").and_then(DocValue::as_f64);
        let max = obj.get("max").and_then(DocValue::as_f64);
        let sum = obj.get("sum").and_then(DocValue::as_f64);
        let count = obj
            .get("value_count")
            .and_then(DocValue::as_f64)
            .map(|c| c as u64);
        if let (Some(min), Some(max), Some(sum), Some(count)) = (min, max, sum, count) {
            if count == 0 {
                return;
            }
            self.min = self.min.min(min);
            self.max = self.max.max(max);
            self.sum += sum;
            self.value_count += count;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        self.value_count == 0
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn sum(&self) -> f64 {
        self.sum.value()
    }

    pub fn value_count(&self) -> u64 {
        self.value_count
    }

    /// Merges another gauge producer's accumulated state into this one,
    /// per the aggregate-metric combination rules in §4.2: `min = min(mins)`,
    /// `max = max(maxes)`, `sum = sum(sums)`, `value_count = sum(value_counts)`.
    pub fn merge_from(&mut self, other: &GaugeProducer) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum.value();
        self.value_count += other.value_count;
    }

    /// Serializes as the `{min, max, sum, value_count}` composite object.
    /// Returns `None` when no value was ever collected — the caller must
    /// not write a field for an all-missing metric.
    pub fn to_doc_value(&self) -> Option<DocValue> {
        if self.is_empty() {
            return None;
        }
        let mut obj = Document::new();
        obj.insert("min".to_string(), DocValue::F64(self.min));
        obj.insert("max".to_string(), DocValue::F64(self.max));
        obj.insert("sum".to_string(), DocValue::F64(self.sum.value()));
        obj.insert(
            "value_count".to_string(),
            DocValue::I64(self.value_count as i64),
        );
        Some(DocValue::Object(obj))
    }

    pub fn write(&self, doc: &mut Document, field_name: &str) {
        if let Some(v) = self.to_doc_value() {
            doc.insert(field_name.to_string(), v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn single_value_has_min_eq_max_eq_sum() {
        let mut g = GaugeProducer::new();
        g.collect(Some(&DocValue::F64(42.0)), 0);
        assert_eq!(g.min(), 42.0);
        assert_eq!(g.max(), 42.0);
        assert_eq!(g.sum(), 42.0);
        assert_eq!(g.value_count(), 1);
    }

    #[test]
    fn missing_values_are_skipped() {
        let mut g = GaugeProducer::new();
        g.collect(None, 0);
        g.collect(Some(&DocValue::F64(5.0)), 1);
        g.collect(None, 2);
        assert_eq!(g.value_count(), 1);
        assert_eq!(g.sum(), 5.0);
    }

    #[test]
    fn non_numeric_values_are_skipped() {
        let mut g = GaugeProducer::new();
        g.collect(Some(&DocValue::String("x".into())), 0);
        assert!(g.is_empty());
    }

    #[test_case(&[1.0, 3.0, 2.0] => (1.0, 3.0, 6.0, 3) ; "three values")]
    #[test_case(&[7.0] => (7.0, 7.0, 7.0, 1) ; "one value")]
    fn aggregates_min_max_sum_count(values: &[f64]) -> (f64, f64, f64, u64) {
        let mut g = GaugeProducer::new();
        for v in values {
            g.collect(Some(&DocValue::F64(*v)), 0);
        }
        (g.min(), g.max(), g.sum(), g.value_count())
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let mut g = GaugeProducer::new();
        g.collect(Some(&DocValue::F64(1.0)), 0);
        g.reset();
        assert!(g.is_empty());
    }

    #[test]
    fn empty_producer_serializes_to_none() {
        let g = GaugeProducer::new();
        assert!(g.to_doc_value().is_none());
    }

    #[test]
    fn merging_combines_min_max_sum_count() {
        let mut a = GaugeProducer::new();
        a.collect(Some(&DocValue::F64(1.0)), 0);
        a.collect(Some(&DocValue::F64(5.0)), 1);

        let mut b = GaugeProducer::new();
        b.collect(Some(&DocValue::F64(3.0)), 0);

        a.merge_from(&b);
        assert_eq!(a.min(), 1.0);
        assert_eq!(a.max(), 5.0);
        assert_eq!(a.sum(), 9.0);
        assert_eq!(a.value_count(), 3);
    }

    #[test]
    fn collects_pre_aggregated_object_value() {
        let mut g = GaugeProducer::new();
        let mut obj = Document::new();
        obj.insert("min".into(), DocValue::F64(1.0));
        obj.insert("max".into(), DocValue::F64(9.0));
        obj.insert("sum".into(), DocValue::F64(20.0));
        obj.insert("value_count".into(), DocValue::I64(4));
        g.collect(Some(&DocValue::Object(obj)), 0);
        assert_eq!(g.min(), 1.0);
        assert_eq!(g.max(), 9.0);
        assert_eq!(g.sum(), 20.0);
        assert_eq!(g.value_count(), 4);
    }
}
