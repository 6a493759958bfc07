//! The external ordered-document-iterator contract (§4.4). The engine
//! treats the source shard's inverted-index machinery as an abstract
//! collaborator; this module only defines the shape of that collaborator
//! and a small in-memory test double used throughout this crate's tests.

use crate::error::DownsampleResult;
use crate::model::{DocId, DocValue, LeafId, Timestamp, TsId};

/// One source document as seen by the [`crate::collector::Collector`]:
/// identity, ordering key, and the per-field doc-values this document
/// carries. `field_values[i]` corresponds to the `i`-th entry of the
/// [`crate::collector::FieldPlan`] the collector was built with, in order.
#[derive(Clone, Debug)]
pub struct SourceDoc {
    pub tsid: TsId,
    pub tsid_ord: i64,
    pub timestamp_ms: Timestamp,
    pub doc_id: DocId,
    pub leaf_id: LeafId,
    /// `None` defaults to `1` per §3's doc-count semantics.
    pub doc_count: Option<u64>,
    pub field_values: Vec<Option<DocValue>>,
}

/// A caller-supplied cancellation check, polled by the iterator at a
/// bounded frequency (§4.4: "at least once per leaf and once per N
/// documents"). Returns `Err(DownsampleError::Cancelled)` once cancellation
/// has been observed.
pub trait CancellationCheck {
    fn check(&self) -> DownsampleResult<()>;
}

impl<F: Fn() -> DownsampleResult<()>> CancellationCheck for F {
    fn check(&self) -> DownsampleResult<()> {
        self()
    }
}

/// Never-cancels check, useful for tests that don't exercise cancellation.
pub struct NeverCancel;

impl CancellationCheck for NeverCancel {
    fn check(&self) -> DownsampleResult<()> {
        Ok(())
    }
}

/// Yields `(series_id, series_ord, timestamp, doc_id, leaf_ctx)` tuples
/// sorted by series ascending, then timestamp descending within series
/// (§4.4). Honors an inclusive resume predicate: `tsid >= resume_tsid`.
pub trait OrderedDocIterator {
    /// Invokes `visit` once per document in order. `visit` returning `Err`
    /// (e.g. the collector detected an ordering violation, or cancellation
    /// fired) stops iteration and propagates the error.
    fn run(
        &mut self,
        resume_tsid: Option<&TsId>,
        cancel: &dyn CancellationCheck,
        visit: &mut dyn FnMut(&SourceDoc) -> DownsampleResult<()>,
    ) -> DownsampleResult<()>;
}

/// Lets `ShardDriver` hand the collector a boxed trait object from its own
/// (external, searcher-supplied) iterator without the collector caring.
impl OrderedDocIterator for Box<dyn OrderedDocIterator> {
    fn run(
        &mut self,
        resume_tsid: Option<&TsId>,
        cancel: &dyn CancellationCheck,
        visit: &mut dyn FnMut(&SourceDoc) -> DownsampleResult<()>,
    ) -> DownsampleResult<()> {
        (**self).run(resume_tsid, cancel, visit)
    }
}

/// An in-memory iterator over a fixed, pre-sorted list of documents. Used
/// by this crate's own tests in place of a real shard searcher (§9b test
/// tooling): the caller is responsible for presenting documents in the
/// order §4.4 requires — this double does not re-sort.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDocIterator {
    docs: Vec<SourceDoc>,
    poll_every: usize,
}

impl InMemoryDocIterator {
    pub fn new(docs: Vec<SourceDoc>) -> Self {
        Self {
            docs,
            poll_every: 1,
        }
    }

    /// Polls the cancellation hook every `n` documents instead of every
    /// document, to exercise §4.4's "bounded frequency, not necessarily
    /// every document" allowance.
    pub fn poll_every(mut self, n: usize) -> Self {
        self.poll_every = n.max(1);
        self
    }
}

impl OrderedDocIterator for InMemoryDocIterator {
    fn run(
        &mut self,
        resume_tsid: Option<&TsId>,
        cancel: &dyn CancellationCheck,
        visit: &mut dyn FnMut(&SourceDoc) -> DownsampleResult<()>,
    ) -> DownsampleResult<()> {
        cancel.check()?;
        for (i, doc) in self.docs.iter().enumerate() {
            if let Some(resume) = resume_tsid {
                if doc.tsid < *resume {
                    continue;
                }
            }
            if i % self.poll_every == 0 {
                cancel.check()?;
            }
            visit(doc)?;
        }
        cancel.check()?;
        Ok(())
    }
}
