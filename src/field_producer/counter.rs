//! Counter metric accumulator: the last-observed value in the bucket. Since
//! the document stream arrives timestamp-descending within a series (§3),
//! "last observed" means "first `collect` call wins" — see §4.2.

use crate::model::{DocId, DocValue, Document};

#[derive(Clone, Debug, Default)]
pub struct CounterProducer {
    value: Option<DocValue>,
}

impl CounterProducer {
    pub fn new() -> Self {
        Self { value: None }
    }

    pub fn collect(&mut self, value: Option<&DocValue>, _doc_id: DocId) {
        if self.value.is_some() {
            return;
        }
        self.value = value.cloned();
    }

    pub fn reset(&mut self) {
        self.value = None;
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Option<&DocValue> {
        self.value.as_ref()
    }

    pub fn write(&self, doc: &mut Document, field_name: &str) {
        if let Some(v) = &self.value {
            doc.insert(field_name.to_string(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_collect_wins() {
        let mut c = CounterProducer::new();
        c.collect(Some(&DocValue::I64(180)), 0);
        c.collect(Some(&DocValue::I64(150)), 1);
        assert_eq!(c.value(), Some(&DocValue::I64(180)));
    }

    #[test]
    fn missing_first_value_does_not_block_later_ones() {
        let mut c = CounterProducer::new();
        c.collect(None, 0);
        c.collect(Some(&DocValue::I64(42)), 1);
        assert_eq!(c.value(), Some(&DocValue::I64(42)));
    }

    #[test]
    fn reset_clears_value() {
        let mut c = CounterProducer::new();
        c.collect(Some(&DocValue::I64(1)), 0);
        c.reset();
        assert!(c.is_empty());
    }
}
