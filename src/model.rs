//! Shared value types used across the downsample engine: series identity,
//! the self-describing document value, and the small integer aliases that
//! show up in every component's signature.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Millisecond timestamp, always UTC-epoch based regardless of the
/// configured time zone (the time zone only affects bucket rounding).
pub type Timestamp = i64;

/// Opaque per-segment document handle, meaningful only to the
/// [`crate::iterator::OrderedDocIterator`] and its per-leaf doc-values
/// accessors that produced it.
pub type DocId = u64;

/// Opaque per-segment leaf handle. Not stable across shard runs.
pub type LeafId = u32;

/// Opaque byte sequence uniquely identifying a time series within the
/// source index. Comparable as unsigned bytes (the derived `Ord` on
/// `Vec<u8>` already does this, since `u8` has no sign bit to confuse
/// lexicographic ordering).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TsId(Box<[u8]>);

impl TsId {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for TsId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl From<Vec<u8>> for TsId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl fmt::Display for TsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A typed value carried by a source doc-value or an output document field.
/// Deliberately format-agnostic: the engine treats the target index writer
/// as an external collaborator, so this is not bound to JSON, CBOR, or any
/// other wire encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Array(Vec<DocValue>),
    /// A nested self-describing sub-document. Used for the `{min, max, sum,
    /// value_count}` aggregate-metric field a gauge producer emits, and for
    /// a pre-aggregated source value a gauge producer can ingest in turn.
    Object(Document),
}

impl DocValue {
    /// Numeric coercion used by gauge/counter producers. Returns `None` for
    /// non-numeric values, which the caller treats the same as "missing".
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DocValue::I64(v) => Some(*v as f64),
            DocValue::F64(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for DocValue {
    fn from(v: f64) -> Self {
        DocValue::F64(v)
    }
}

impl From<i64> for DocValue {
    fn from(v: i64) -> Self {
        DocValue::I64(v)
    }
}

impl From<&str> for DocValue {
    fn from(v: &str) -> Self {
        DocValue::String(v.to_string())
    }
}

impl From<String> for DocValue {
    fn from(v: String) -> Self {
        DocValue::String(v)
    }
}

impl From<bool> for DocValue {
    fn from(v: bool) -> Self {
        DocValue::Bool(v)
    }
}

/// A self-describing rollup document: an ordered field map. `BTreeMap` gives
/// deterministic field order, which matters for tests asserting on exact
/// emitted output.
pub type Document = BTreeMap<String, DocValue>;

pub const DOC_COUNT_FIELD: &str = "_doc_count";
