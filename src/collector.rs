//! Drives the [`crate::iterator::OrderedDocIterator`], detects bucket
//! boundaries, flushes the [`BucketBuilder`], enforces the stream's
//! ordering invariants, and reports progress (§4.5).

use std::cmp::Ordering;

use crate::bucket::{BucketBuilder, FieldWiring};
use crate::common::rounding::{Interval, round_down};
use crate::error::{DownsampleError, DownsampleResult};
use crate::iterator::{CancellationCheck, OrderedDocIterator, SourceDoc};
use crate::model::{Document, Timestamp, TsId};
use chrono_tz::Tz;

/// Per-field wiring: how a physical source field (by position in
/// `SourceDoc::field_values`) maps onto a producer slot in the
/// `BucketBuilder`'s producer array.
pub type FieldPlan = Vec<FieldWiring>;

/// Running progress counters, mirroring §6.2's "side-effect on task handle"
/// progress fields that apply at the collection stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub num_received: u64,
    pub docs_processed: u64,
    pub buckets_emitted: u64,
    pub last_source_ts: Timestamp,
    pub last_target_ts: Timestamp,
}

pub struct Collector<F> {
    builder: BucketBuilder,
    field_plan: FieldPlan,
    interval: Interval,
    time_zone: Tz,
    index_start_ms: Timestamp,
    decode_dimensions: F,
    last_histo_timestamp: Timestamp,
    last_seen_tsid: Option<TsId>,
    last_seen_timestamp: Timestamp,
    stats: CollectorStats,
}

impl<F> Collector<F>
where
    F: Fn(&TsId) -> Vec<(String, crate::model::DocValue)>,
{
    pub fn new(
        builder: BucketBuilder,
        field_plan: FieldPlan,
        interval: Interval,
        time_zone: Tz,
        index_start_ms: Timestamp,
        decode_dimensions: F,
    ) -> Self {
        Self {
            builder,
            field_plan,
            interval,
            time_zone,
            index_start_ms,
            decode_dimensions,
            last_histo_timestamp: index_start_ms,
            last_seen_tsid: None,
            last_seen_timestamp: Timestamp::MAX,
            stats: CollectorStats::default(),
        }
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Drives `iterator` to completion, calling `emit` once per flushed
    /// bucket in emission order. Returns the final progress counters.
    pub fn run(
        &mut self,
        iterator: &mut impl OrderedDocIterator,
        resume_tsid: Option<&TsId>,
        cancel: &dyn CancellationCheck,
        emit: &mut dyn FnMut(Document) -> DownsampleResult<()>,
    ) -> DownsampleResult<CollectorStats> {
        iterator.run(resume_tsid, cancel, &mut |doc| self.process_doc(doc, emit))?;

        if !self.builder.is_empty() {
            self.flush(emit)?;
        }
        cancel.check()?;
        Ok(self.stats)
    }

    fn assert_monotonic(&mut self, doc: &SourceDoc) -> DownsampleResult<()> {
        if let Some(last) = &self.last_seen_tsid {
            match doc.tsid.cmp(last) {
                Ordering::Less => {
                    return Err(DownsampleError::OrderingViolation(format!(
                        "tsid decreased: {} < {}",
                        doc.tsid, last
                    )));
                }
                Ordering::Equal => {
                    if doc.timestamp_ms > self.last_seen_timestamp {
                        return Err(DownsampleError::OrderingViolation(format!(
                            "timestamp increased within series {}: {} > {}",
                            doc.tsid, doc.timestamp_ms, self.last_seen_timestamp
                        )));
                    }
                }
                Ordering::Greater => {}
            }
        }
        self.last_seen_tsid = Some(doc.tsid.clone());
        self.last_seen_timestamp = doc.timestamp_ms;
        Ok(())
    }

    fn process_doc(
        &mut self,
        doc: &SourceDoc,
        emit: &mut dyn FnMut(Document) -> DownsampleResult<()>,
    ) -> DownsampleResult<()> {
        let candidate_bucket =
            round_down(doc.timestamp_ms, &self.interval, &self.time_zone).max(self.index_start_ms);

        let ord_equal = doc.tsid_ord == self.builder.current_tsid_ord();
        let series_changed = if !ord_equal {
            true
        } else {
            match self.builder.current_tsid() {
                Some(cur) => cur != &doc.tsid,
                None => true,
            }
        };

        if series_changed || doc.timestamp_ms < self.last_histo_timestamp {
            self.last_histo_timestamp = candidate_bucket;
        }

        self.assert_monotonic(doc)?;

        if series_changed || self.builder.current_bucket_start_ms() != self.last_histo_timestamp {
            if !self.builder.is_empty() {
                self.flush(emit)?;
            }
            if series_changed {
                self.builder
                    .reset_series(&doc.tsid, doc.tsid_ord, self.last_histo_timestamp);
            } else {
                self.builder.reset_bucket(self.last_histo_timestamp);
            }
        }

        self.builder.collect_doc_count(doc.doc_count.unwrap_or(1));
        for (i, wiring) in self.field_plan.iter().enumerate() {
            let value = doc.field_values.get(i).and_then(|v| v.as_ref());
            self.builder.collect_field(*wiring, value, doc.doc_id);
        }

        self.stats.num_received += 1;
        self.stats.docs_processed += 1;
        self.stats.last_source_ts = doc.timestamp_ms;
        Ok(())
    }

    fn flush(&mut self, emit: &mut dyn FnMut(Document) -> DownsampleResult<()>) -> DownsampleResult<()> {
        if let Some(doc) = self.builder.serialize(&self.decode_dimensions) {
            self.stats.buckets_emitted += 1;
            self.stats.last_target_ts = self.builder.current_bucket_start_ms();
            emit(doc)?;
        }
        Ok(())
    }
}
