//! Top-level shard orchestration (§4.7): resolves the resume point, opens
//! the source-shard iterator, wires `Collector` into `BulkSink`, publishes
//! task status transitions, and produces the final `ShardReport`.

use chrono_tz::Tz;
use tracing::{info, info_span};

use crate::bucket::BucketBuilder;
use crate::bulk_sink::{BulkSink, BulkSinkHandle, BulkWriter, NoopHooks};
use crate::collector::{Collector, FieldPlan};
use crate::common::rounding::Interval;
use crate::config::BulkSinkConfig;
use crate::error::{DownsampleError, DownsampleResult};
use crate::field_producer::FieldProducer;
use crate::iterator::{CancellationCheck, OrderedDocIterator};
use crate::model::{DocValue, Document, Timestamp, TsId};

/// Mirrors the persistent-task framework's status enum (§6.3). The engine
/// never observes `Initializing` itself — `ShardDriver::run` transitions
/// straight to `Started` on entry — but a caller's persisted `TaskState`
/// may still carry it for a shard that has never run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Initializing,
    Started,
    Completed,
    Cancelled,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Initializing
    }
}

/// The persisted shard-level checkpoint (§3 "Task state record"). Only
/// `last_completed_tsid` is consulted for resume, and only when `status`
/// indicates a prior run was interrupted mid-flight.
#[derive(Clone, Debug, Default)]
pub struct TaskState {
    pub status: TaskStatus,
    pub last_completed_tsid: Option<TsId>,
}

/// External collaborator: the persistent-task framework's status-update
/// hook (§6.3). The engine's responsibility ends at calling this.
pub trait TaskStatusPublisher: Send + Sync {
    fn publish(&self, status: TaskStatus);
}

/// A publisher that discards every transition, for callers that track
/// status some other way (or not at all, in tests).
pub struct NoopPublisher;

impl TaskStatusPublisher for NoopPublisher {
    fn publish(&self, _status: TaskStatus) {}
}

/// RAII guard for the exclusive read-lease `ShardDriver::run` holds on the
/// source shard for the run's duration (§9b). Released on every exit path,
/// including an unwind through cancellation or a propagated error.
pub struct ShardLease {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ShardLease {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Default for ShardLease {
    fn default() -> Self {
        Self { release: None }
    }
}

impl Drop for ShardLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// `{shard_id, indexed_count}` (§6.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardReport {
    pub shard_id: u32,
    pub indexed_count: u64,
}

/// Combines the caller's external cancellation check with the bulk sink's
/// sticky abort flag, so a single `CancellationCheck` can be handed to both
/// the iterator and the collector (§4.7: "Both are observed synchronously
/// at the next checkCancelled call").
struct CombinedCancel<'a, W, H> {
    external: &'a dyn CancellationCheck,
    sink: BulkSinkHandle<W, H>,
}

impl<'a, W, H> CancellationCheck for CombinedCancel<'a, W, H> {
    fn check(&self) -> DownsampleResult<()> {
        self.external.check()?;
        if self.sink.is_aborted() {
            return Err(DownsampleError::BulkIndexingFailure {
                retryable: true,
                item_failures: self.sink.item_failures().len(),
                message: "bulk sink aborted after item failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Drives one shard-run invocation from resume resolution through to a
/// final `ShardReport`. Constructed once per shard; `run` is called once.
pub struct ShardDriver<W, P, F, MP> {
    timestamp_field: String,
    interval: Interval,
    time_zone: Tz,
    index_start_ms: Timestamp,
    field_plan: FieldPlan,
    make_producers: MP,
    decode_dimensions: F,
    sink_config: BulkSinkConfig,
    writer: W,
    publisher: P,
}

impl<W, P, F, MP> ShardDriver<W, P, F, MP>
where
    W: BulkWriter + Clone,
    P: TaskStatusPublisher,
    F: Fn(&TsId) -> Vec<(String, DocValue)>,
    MP: Fn() -> Vec<FieldProducer>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp_field: impl Into<String>,
        interval: Interval,
        time_zone: Tz,
        index_start_ms: Timestamp,
        field_plan: FieldPlan,
        make_producers: MP,
        decode_dimensions: F,
        sink_config: BulkSinkConfig,
        writer: W,
        publisher: P,
    ) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
            interval,
            time_zone,
            index_start_ms,
            field_plan,
            make_producers,
            decode_dimensions,
            sink_config,
            writer,
            publisher,
        }
    }

    /// `open_iterator` is handed the resolved resume point and must return
    /// a ready-to-drive iterator plus the shard's read lease (§4.7 step 1).
    /// It is the engine's one point of contact with the external shard
    /// searcher (§6.1).
    pub fn run(
        &self,
        shard_id: u32,
        target_index: &str,
        task_state: &TaskState,
        cancel: &dyn CancellationCheck,
        open_iterator: impl FnOnce(
            Option<&TsId>,
        ) -> DownsampleResult<(Box<dyn OrderedDocIterator>, ShardLease)>,
    ) -> DownsampleResult<ShardReport> {
        let span = info_span!("shard_downsample", shard_id, target_index);
        let _enter = span.enter();

        let resume_tsid = match task_state.status {
            TaskStatus::Started => task_state.last_completed_tsid.as_ref(),
            _ => None,
        };

        self.publisher.publish(TaskStatus::Started);
        info!(resuming = resume_tsid.is_some(), "shard run started");

        let (mut iterator, _lease) = match open_iterator(resume_tsid) {
            Ok(opened) => opened,
            Err(e) => {
                self.publisher.publish(TaskStatus::Failed);
                return Err(e);
            }
        };

        let builder = BucketBuilder::new(self.timestamp_field.clone(), (self.make_producers)());
        let mut collector = Collector::new(
            builder,
            self.field_plan.clone(),
            self.interval,
            self.time_zone,
            self.index_start_ms,
            &self.decode_dimensions,
        );

        let mut sink = BulkSink::new(
            self.writer.clone(),
            NoopHooks,
            self.sink_config,
            self.timestamp_field.clone(),
        );
        let sink_handle = sink.handle();
        let run_cancel = CombinedCancel {
            external: cancel,
            sink: sink_handle.clone(),
        };

        let collect_result = {
            let mut emit = |doc: Document| -> DownsampleResult<()> { sink.enqueue(doc) };
            collector.run(&mut iterator, resume_tsid, &run_cancel, &mut emit)
        };
        let close_result = sink.close();

        match (collect_result, close_result) {
            (Err(DownsampleError::Cancelled), _) => {
                self.publisher.publish(TaskStatus::Cancelled);
                Err(DownsampleError::Cancelled)
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                self.publisher.publish(TaskStatus::Failed);
                Err(e)
            }
            (Ok(stats), Ok(())) => {
                let item_failures = sink_handle.item_failures();
                if !item_failures.is_empty() {
                    self.publisher.publish(TaskStatus::Failed);
                    return Err(DownsampleError::BulkIndexingFailure {
                        retryable: true,
                        item_failures: item_failures.len(),
                        message: "bulk sink reported item-level failures".to_string(),
                    });
                }

                let indexed_count = sink_handle.indexed_count();
                let sent_count = sink_handle.sent_count();
                if indexed_count != sent_count {
                    self.publisher.publish(TaskStatus::Failed);
                    return Err(DownsampleError::BulkIndexingFailure {
                        retryable: true,
                        item_failures: 0,
                        message: format!(
                            "indexed_count ({indexed_count}) != sent_count ({sent_count})"
                        ),
                    });
                }

                self.publisher.publish(TaskStatus::Completed);
                info!(
                    buckets_emitted = stats.buckets_emitted,
                    indexed_count,
                    last_index_ts = sink_handle.last_index_ts(),
                    "shard run completed"
                );
                Ok(ShardReport {
                    shard_id,
                    indexed_count,
                })
            }
        }
    }
}
