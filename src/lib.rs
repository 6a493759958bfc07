//! Per-shard streaming downsample engine for a time-series source index.
//!
//! Reads documents from one shard of a read-only source index, groups them
//! by time-series identity and by a fixed time bucket, computes per-bucket
//! aggregates for each metric and representative values for each label, and
//! writes one rollup document per (series, bucket) into a target index.
//!
//! [`collector::Collector`] is the bucket state machine, driven by an
//! externally-supplied [`iterator::OrderedDocIterator`]; [`bulk_sink::BulkSink`]
//! buffers and dispatches the documents it emits; [`shard_driver::ShardDriver`]
//! ties the two together into one shard-run invocation.

pub mod bucket;
pub mod bulk_sink;
pub mod collector;
pub mod common;
pub mod config;
pub mod error;
pub mod field_producer;
pub mod iterator;
pub mod model;
pub mod shard_driver;
