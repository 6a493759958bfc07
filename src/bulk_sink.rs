//! Buffers emitted rollup documents, dispatches batches on the host's
//! work-stealing pool, applies in-flight-bytes backpressure, retries
//! transient transport failures, and surfaces a sticky abort flag on
//! item-level failure (§4.6, §5).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::BulkSinkConfig;
use crate::error::{DownsampleError, TransportError};
use crate::model::{Document, DocValue, Timestamp};

const RETRY_BACKOFF_BASE_MS: u64 = 20;

/// One source-document failure reported inside an otherwise-acknowledged
/// batch.
#[derive(Clone, Debug)]
pub struct ItemFailure {
    pub index: usize,
    pub message: String,
}

/// Result of a successfully-acknowledged batch dispatch (the transport call
/// itself didn't fail, though individual items within it might have).
#[derive(Clone, Debug, Default)]
pub struct BatchAck {
    pub item_failures: Vec<ItemFailure>,
}

/// The external bulk-write transport (§6.1's "target-index writer"). A
/// single call writes one batch; retryable vs. fatal transport failures are
/// distinguished via [`TransportError::retryable`].
pub trait BulkWriter: Send + Sync + 'static {
    fn write_batch(&self, batch: &[Document]) -> Result<BatchAck, TransportError>;
}

/// Hooks invoked around each batch dispatch, used by `ShardDriver` to
/// maintain status counters (§4.6).
pub trait BulkSinkHooks: Send + Sync + 'static {
    fn on_before(&self, batch_bytes: usize, action_count: usize);
    fn on_after(&self, success: bool, took: Duration, item_failures: usize);
}

/// A no-op implementation for callers that don't need progress hooks.
pub struct NoopHooks;

impl BulkSinkHooks for NoopHooks {
    fn on_before(&self, _batch_bytes: usize, _action_count: usize) {}
    fn on_after(&self, _success: bool, _took: Duration, _item_failures: usize) {}
}

#[derive(Default)]
struct SinkState {
    in_flight_bytes: usize,
    pending_batches: usize,
    abort: bool,
    sent_count: u64,
    indexed_count: u64,
    failed_count: u64,
    item_failures: Vec<ItemFailure>,
    /// `last_index_ts` from §6.2's progress counters: the largest
    /// `timestamp_field` value among successfully-acknowledged documents.
    last_index_ts: Timestamp,
}

/// Shared between the enqueueing collector thread and the dispatcher tasks
/// spawned onto the host's thread pool.
struct Shared<W, H> {
    writer: W,
    hooks: H,
    config: BulkSinkConfig,
    timestamp_field: String,
    state: Mutex<SinkState>,
    condvar: Condvar,
}

pub struct BulkSink<W, H = NoopHooks> {
    shared: Arc<Shared<W, H>>,
    buffer: Vec<Document>,
    buffer_bytes: usize,
}

/// A cheap, cloneable read-only view onto a sink's shared state. Lets a
/// caller (e.g. `ShardDriver`'s combined cancellation check) observe the
/// abort flag and counters without fighting the borrow checker over the
/// `&mut BulkSink` the enqueue side needs.
pub struct BulkSinkHandle<W, H> {
    shared: Arc<Shared<W, H>>,
}

impl<W, H> Clone for BulkSinkHandle<W, H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W, H> BulkSinkHandle<W, H> {
    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().abort
    }

    pub fn sent_count(&self) -> u64 {
        self.shared.state.lock().sent_count
    }

    pub fn indexed_count(&self) -> u64 {
        self.shared.state.lock().indexed_count
    }

    pub fn failed_count(&self) -> u64 {
        self.shared.state.lock().failed_count
    }

    pub fn item_failures(&self) -> Vec<ItemFailure> {
        self.shared.state.lock().item_failures.clone()
    }

    pub fn last_index_ts(&self) -> Timestamp {
        self.shared.state.lock().last_index_ts
    }
}

fn estimate_size(doc: &Document) -> usize {
    serde_json::to_vec(doc).map(|v| v.len()).unwrap_or(0)
}

impl<W, H> BulkSink<W, H>
where
    W: BulkWriter,
    H: BulkSinkHooks,
{
    pub fn new(
        writer: W,
        hooks: H,
        config: BulkSinkConfig,
        timestamp_field: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                writer,
                hooks,
                config,
                timestamp_field: timestamp_field.into(),
                state: Mutex::new(SinkState::default()),
                condvar: Condvar::new(),
            }),
            buffer: Vec::new(),
            buffer_bytes: 0,
        }
    }

    /// Sticky abort flag, set on any item-level failure; observed by
    /// `Collector`'s cancellation check via `ShardDriver`.
    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().abort
    }

    pub fn sent_count(&self) -> u64 {
        self.shared.state.lock().sent_count
    }

    pub fn indexed_count(&self) -> u64 {
        self.shared.state.lock().indexed_count
    }

    pub fn failed_count(&self) -> u64 {
        self.shared.state.lock().failed_count
    }

    pub fn last_index_ts(&self) -> Timestamp {
        self.shared.state.lock().last_index_ts
    }

    /// Buffers `doc`, dispatching the current batch if a threshold is
    /// reached. Returns without dispatching if the abort flag is already
    /// set — the caller must stop pulling more documents in that case.
    pub fn enqueue(&mut self, doc: Document) -> DownsampleResultUnit {
        if self.is_aborted() {
            return Ok(());
        }
        let size = estimate_size(&doc);
        self.buffer.push(doc);
        self.buffer_bytes += size;

        if self.buffer.len() >= self.shared.config.max_actions
            || self.buffer_bytes >= self.shared.config.max_batch_bytes
        {
            self.dispatch()?;
        }
        Ok(())
    }

    fn dispatch(&mut self) -> DownsampleResultUnit {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let batch_bytes = std::mem::take(&mut self.buffer_bytes);
        let action_count = batch.len();

        self.wait_for_in_flight_capacity(batch_bytes);
        if self.is_aborted() {
            return Ok(());
        }

        {
            let mut state = self.shared.state.lock();
            state.in_flight_bytes += batch_bytes;
            state.pending_batches += 1;
            state.sent_count += action_count as u64;
        }

        self.shared.hooks.on_before(batch_bytes, action_count);

        let shared = Arc::clone(&self.shared);
        rayon::spawn(move || run_batch_with_retries(shared, batch, batch_bytes));
        Ok(())
    }

    /// Blocks until in-flight bytes would not exceed the cap after adding
    /// `additional_bytes`, or the abort flag becomes true (§4.6).
    fn wait_for_in_flight_capacity(&self, additional_bytes: usize) {
        let mut state = self.shared.state.lock();
        while !state.abort
            && state.in_flight_bytes > 0
            && state.in_flight_bytes + additional_bytes > self.shared.config.max_in_flight_bytes
        {
            self.shared.condvar.wait(&mut state);
        }
    }

    /// Flushes the remaining buffer and waits for all in-flight batches to
    /// complete (success or terminal failure) (§4.6 Close).
    pub fn close(mut self) -> DownsampleResultUnit {
        self.dispatch()?;
        let mut state = self.shared.state.lock();
        while state.pending_batches > 0 {
            self.shared.condvar.wait(&mut state);
        }
        Ok(())
    }

    pub fn item_failures(&self) -> Vec<ItemFailure> {
        self.shared.state.lock().item_failures.clone()
    }

    /// A lightweight, cloneable handle onto this sink's shared state.
    pub fn handle(&self) -> BulkSinkHandle<W, H> {
        BulkSinkHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

type DownsampleResultUnit = Result<(), DownsampleError>;

fn run_batch_with_retries<W, H>(shared: Arc<Shared<W, H>>, batch: Vec<Document>, batch_bytes: usize)
where
    W: BulkWriter,
    H: BulkSinkHooks,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    let outcome = loop {
        match shared.writer.write_batch(&batch) {
            Ok(ack) => break Ok(ack),
            Err(e) if e.retryable && attempt < shared.config.max_retries => {
                attempt += 1;
                std::thread::sleep(Duration::from_millis(
                    RETRY_BACKOFF_BASE_MS * 2u64.pow(attempt - 1),
                ));
            }
            Err(e) => break Err(e),
        }
    };

    let took = started.elapsed();
    let mut state = shared.state.lock();
    state.in_flight_bytes = state.in_flight_bytes.saturating_sub(batch_bytes);
    state.pending_batches -= 1;

    match outcome {
        Ok(ack) => {
            let failures = ack.item_failures.len();
            state.indexed_count += (batch.len() - failures) as u64;
            if !ack.item_failures.is_empty() {
                state.failed_count += failures as u64;
                state.abort = true;
                state.item_failures.extend(ack.item_failures);
            }
            let batch_max_ts = batch
                .iter()
                .filter_map(|doc| doc.get(&shared.timestamp_field))
                .filter_map(|v| match v {
                    DocValue::I64(ts) => Some(*ts),
                    _ => None,
                })
                .max();
            if let Some(ts) = batch_max_ts {
                state.last_index_ts = state.last_index_ts.max(ts);
            }
            shared.hooks.on_after(true, took, failures);
        }
        Err(_transport_err) => {
            state.abort = true;
            state.failed_count += batch.len() as u64;
            shared.hooks.on_after(false, took, 0);
        }
    }
    shared.condvar.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysSucceeds;
    impl BulkWriter for AlwaysSucceeds {
        fn write_batch(&self, _batch: &[Document]) -> Result<BatchAck, TransportError> {
            Ok(BatchAck::default())
        }
    }

    struct FailsWithItems;
    impl BulkWriter for FailsWithItems {
        fn write_batch(&self, _batch: &[Document]) -> Result<BatchAck, TransportError> {
            Ok(BatchAck {
                item_failures: vec![ItemFailure {
                    index: 0,
                    message: "boom".into(),
                }],
            })
        }
    }

    struct CountingHooks {
        before: AtomicUsize,
        after: AtomicUsize,
    }
    impl BulkSinkHooks for CountingHooks {
        fn on_before(&self, _batch_bytes: usize, _action_count: usize) {
            self.before.fetch_add(1, Ordering::SeqCst);
        }
        fn on_after(&self, _success: bool, _took: Duration, _item_failures: usize) {
            self.after.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn doc(n: i64) -> Document {
        let mut d = Document::new();
        d.insert("n".to_string(), crate::model::DocValue::I64(n));
        d
    }

    #[test]
    fn dispatches_on_max_actions_threshold() {
        let config = BulkSinkConfig {
            max_actions: 2,
            ..BulkSinkConfig::default()
        };
        let mut sink = BulkSink::new(AlwaysSucceeds, NoopHooks, config, "@timestamp");
        sink.enqueue(doc(1)).unwrap();
        sink.enqueue(doc(2)).unwrap();
        sink.close().unwrap();
    }

    #[test]
    fn close_waits_for_in_flight_batches() {
        let config = BulkSinkConfig::default();
        let hooks = CountingHooks {
            before: AtomicUsize::new(0),
            after: AtomicUsize::new(0),
        };
        let mut sink = BulkSink::new(AlwaysSucceeds, hooks, config, "@timestamp");
        for i in 0..5 {
            sink.enqueue(doc(i)).unwrap();
        }
        let shared = Arc::clone(&sink.shared);
        sink.close().unwrap();
        let state = shared.state.lock();
        assert_eq!(state.pending_batches, 0);
    }

    #[test]
    fn item_failures_set_sticky_abort() {
        let config = BulkSinkConfig {
            max_actions: 1,
            ..BulkSinkConfig::default()
        };
        let mut sink = BulkSink::new(FailsWithItems, NoopHooks, config, "@timestamp");
        sink.enqueue(doc(1)).unwrap();
        // Give the dispatcher thread a moment to run and set the flag.
        std::thread::sleep(Duration::from_millis(50));
        assert!(sink.is_aborted());
        sink.close().unwrap();
        assert!(!sink.item_failures().is_empty());
    }

    #[test]
    fn enqueue_after_abort_is_a_no_op() {
        let config = BulkSinkConfig {
            max_actions: 1,
            ..BulkSinkConfig::default()
        };
        let mut sink = BulkSink::new(FailsWithItems, NoopHooks, config, "@timestamp");
        sink.enqueue(doc(1)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(sink.is_aborted());
        sink.enqueue(doc(2)).unwrap();
        assert!(sink.buffer.is_empty()); // doc(2) was dropped, not buffered or dispatched
        sink.close().unwrap();
    }
}
