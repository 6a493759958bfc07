//! Label accumulator: the last-observed typed value in the bucket (string,
//! numeric, boolean, or array thereof), passed through unchanged. Same
//! first-collect-wins selection as [`super::counter::CounterProducer`] and
//! for the same reason (§4.2).

use crate::model::{DocId, DocValue, Document};

#[derive(Clone, Debug, Default)]
pub struct LabelProducer {
    value: Option<DocValue>,
}

impl LabelProducer {
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
    fn first_collect_wins_for_strings() {
        let mut l = LabelProducer::new();
        l.collect(Some(&DocValue::String("z".into())), 0);
        l.collect(Some(&DocValue::String("y".into())), 1);
        assert_eq!(l.value(), Some(&DocValue::String("z".into())));
    }

    #[test]
    fn passes_through_array_values() {
        let mut l = LabelProducer::new();
        let arr = DocValue::Array(vec![DocValue::String("a".into()), DocValue::String("b".into())]);
        l.collect(Some(&arr), 0);
        assert_eq!(l.value(), Some(&arr));
    }
}
