//! Scorer and order composition.
//!
//! An [`Order`] is an ordered list of scorers. Preparing it lays each
//! scorer's fixed-size score bucket into one flat byte buffer and yields a
//! [`PreparedOrder`] whose composite operations (`less`, `add`, `scale`)
//! apply scorer by scorer. Per query, scorers contribute a statistics
//! [`Collector`] during filter preparation and a [`ScoreCtx`] per segment at
//! execution time; the [`Score`] attribute attached to a document iterator
//! evaluates those contexts lazily into the flat buffer.

use std::sync::Arc;

use crate::attribute::kinds::Cost;
use crate::attribute::{Attribute, AttributeStore, AttributeView};
use crate::doc_id::DocId;
use crate::error::Result;
use crate::index::field::{FieldInfo, IndexFeatures};
use crate::index::reader::{IndexReader, SegmentReader};
use crate::index::term::{TermMeta, TermReader};
use crate::iterator::DocIterator;

/// Multiplicative weight on a filter's score contribution.
pub type Boost = f32;

/// The neutral boost.
pub const NO_BOOST: Boost = 1.0;

/// Corpus statistics collected for one filter leaf, per scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreStats {
    /// Documents in the index snapshot.
    pub total_docs: u64,

    /// Documents with at least one token in the queried field.
    pub docs_with_field: u64,

    /// Total tokens indexed for the queried field.
    pub sum_total_term_freq: u64,

    /// Documents containing the queried term(s).
    pub docs_with_term: u64,

    /// Total occurrences of the queried term(s).
    pub total_term_freq: u64,
}

/// Accumulates corpus statistics while a filter is prepared.
pub trait Collector {
    /// Record a field visited during preparation.
    fn collect_field(&mut self, segment: &dyn SegmentReader, field: &dyn TermReader);

    /// Record a resolved term; `term_attrs` is the term iterator's attribute
    /// view, positioned on the term.
    fn collect_term(&mut self, term_attrs: AttributeView<'_>);

    /// Fold the collected state into per-leaf statistics.
    fn finish(&self, index: &dyn IndexReader) -> ScoreStats;
}

/// The collector the built-in scorers share.
#[derive(Debug, Default)]
pub struct StatsCollector {
    docs_with_field: u64,
    sum_total_term_freq: u64,
    docs_with_term: u64,
    total_term_freq: u64,
}

impl Collector for StatsCollector {
    fn collect_field(&mut self, _segment: &dyn SegmentReader, field: &dyn TermReader) {
        self.docs_with_field += field.docs_count();
        self.sum_total_term_freq += field.stats().total_term_freq;
    }

    fn collect_term(&mut self, term_attrs: AttributeView<'_>) {
        if let Some(meta) = term_attrs.get::<TermMeta>() {
            let meta = meta.borrow();
            self.docs_with_term += meta.docs_count;
            self.total_term_freq += meta.total_freq;
        }
    }

    fn finish(&self, index: &dyn IndexReader) -> ScoreStats {
        ScoreStats {
            total_docs: index.docs_count(),
            docs_with_field: self.docs_with_field,
            sum_total_term_freq: self.sum_total_term_freq,
            docs_with_term: self.docs_with_term,
            total_term_freq: self.total_term_freq,
        }
    }
}

/// Per-segment scoring state bound to a document iterator's attributes.
pub trait ScoreCtx {
    /// Write the current document's score into `dst` (one bucket).
    fn score(&self, dst: &mut [u8]);
}

/// Defines how documents are ranked.
///
/// A scorer owns a fixed-size score bucket and every operation over it;
/// buckets are opaque to everything else.
pub trait Scorer: Send + Sync {
    /// Size of this scorer's bucket in bytes.
    fn bucket_size(&self) -> usize;

    /// The index features this scorer wants from postings.
    fn features(&self) -> IndexFeatures {
        IndexFeatures::NONE
    }

    /// A fresh statistics collector for one filter leaf.
    fn new_collector(&self) -> Box<dyn Collector>;

    /// Instantiate per-segment scoring state.
    ///
    /// `doc_attrs` is the attribute view of the iterator being scored;
    /// typical scorers capture its frequency and document attributes and
    /// resolve norms through the segment's columns.
    fn prepare_scorer(
        &self,
        segment: &dyn SegmentReader,
        field: Option<&FieldInfo>,
        stats: &ScoreStats,
        boost: Boost,
        doc_attrs: AttributeView<'_>,
    ) -> Result<Box<dyn ScoreCtx>>;

    /// Strict weak order over buckets; `true` iff `lhs` ranks below `rhs`.
    fn less(&self, lhs: &[u8], rhs: &[u8]) -> bool;

    /// Merge `src` into `dst`, scorer-wise.
    fn add(&self, dst: &mut [u8], src: &[u8]);

    /// Scale `buf` by a constant factor.
    fn scale(&self, buf: &mut [u8], factor: f32);

    /// Write the bucket of a constant-scoring match with the given boost.
    fn constant(&self, dst: &mut [u8], boost: Boost);
}

/// An ordered composition of scorers, before preparation.
#[derive(Default)]
pub struct Order {
    scorers: Vec<Box<dyn Scorer>>,
}

impl Order {
    /// An order with no scorers.
    pub fn new() -> Self {
        Order::default()
    }

    /// Append a scorer.
    pub fn add(&mut self, scorer: Box<dyn Scorer>) {
        self.scorers.push(scorer);
    }

    /// Append a scorer, chaining.
    pub fn with(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.add(scorer);
        self
    }

    /// Number of scorers.
    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    /// Whether the order has no scorers.
    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    /// Lay out the score buffer and freeze the composition.
    pub fn prepare(self) -> PreparedOrder {
        let mut buckets = Vec::with_capacity(self.scorers.len());
        let mut offset = 0;
        for scorer in self.scorers {
            let size = scorer.bucket_size();
            buckets.push(Bucket {
                scorer,
                offset,
                size,
            });
            offset += size;
        }
        PreparedOrder {
            inner: Arc::new(PreparedOrderInner {
                buckets,
                size: offset,
            }),
        }
    }
}

struct Bucket {
    scorer: Box<dyn Scorer>,
    offset: usize,
    size: usize,
}

struct PreparedOrderInner {
    buckets: Vec<Bucket>,
    size: usize,
}

/// A prepared order: stable bucket layout plus composite bucket operations.
///
/// Cloning is cheap; clones share the composition.
#[derive(Clone)]
pub struct PreparedOrder {
    inner: Arc<PreparedOrderInner>,
}

impl Default for PreparedOrder {
    fn default() -> Self {
        Order::new().prepare()
    }
}

impl PreparedOrder {
    /// A prepared order with no scorers.
    pub fn empty() -> Self {
        PreparedOrder::default()
    }

    /// Size of the flat score buffer in bytes.
    pub fn score_size(&self) -> usize {
        self.inner.size
    }

    /// Whether the order has no scorers.
    pub fn is_empty(&self) -> bool {
        self.inner.buckets.is_empty()
    }

    /// Union of the features the composed scorers want.
    pub fn features(&self) -> IndexFeatures {
        let mut features = IndexFeatures::NONE;
        for bucket in &self.inner.buckets {
            features |= bucket.scorer.features();
        }
        features
    }

    /// Composite strict weak order: scorer by scorer, first difference
    /// wins.
    pub fn less(&self, lhs: &[u8], rhs: &[u8]) -> bool {
        for bucket in &self.inner.buckets {
            let l = &lhs[bucket.offset..bucket.offset + bucket.size];
            let r = &rhs[bucket.offset..bucket.offset + bucket.size];
            if bucket.scorer.less(l, r) {
                return true;
            }
            if bucket.scorer.less(r, l) {
                return false;
            }
        }
        false
    }

    /// Merge `src` into `dst`, scorer-wise.
    pub fn add(&self, dst: &mut [u8], src: &[u8]) {
        for bucket in &self.inner.buckets {
            let range = bucket.offset..bucket.offset + bucket.size;
            bucket.scorer.add(&mut dst[range.clone()], &src[range]);
        }
    }

    /// Scale every bucket of `buf` by `factor`.
    pub fn scale(&self, buf: &mut [u8], factor: f32) {
        for bucket in &self.inner.buckets {
            bucket
                .scorer
                .scale(&mut buf[bucket.offset..bucket.offset + bucket.size], factor);
        }
    }

    /// Write a constant-scoring match into `dst`.
    pub fn constant(&self, dst: &mut [u8], boost: Boost) {
        for bucket in &self.inner.buckets {
            bucket
                .scorer
                .constant(&mut dst[bucket.offset..bucket.offset + bucket.size], boost);
        }
    }

    /// Fresh collectors, one per scorer, for one filter leaf.
    pub fn collectors(&self) -> Collectors {
        Collectors {
            items: self
                .inner
                .buckets
                .iter()
                .map(|bucket| bucket.scorer.new_collector())
                .collect(),
        }
    }

    /// Instantiate per-segment scoring state for every scorer.
    ///
    /// `stats` holds one entry per scorer as produced by
    /// [`Collectors::finish`]; missing entries fall back to defaults.
    pub fn prepare_scorers(
        &self,
        segment: &dyn SegmentReader,
        field: Option<&FieldInfo>,
        stats: &[ScoreStats],
        boost: Boost,
        doc_attrs: AttributeView<'_>,
    ) -> Result<Scorers> {
        let default_stats = ScoreStats::default();
        let mut items = Vec::with_capacity(self.inner.buckets.len());
        for (i, bucket) in self.inner.buckets.iter().enumerate() {
            let ctx = bucket.scorer.prepare_scorer(
                segment,
                field,
                stats.get(i).unwrap_or(&default_stats),
                boost,
                doc_attrs,
            )?;
            items.push(PreparedScorer {
                ctx,
                offset: bucket.offset,
                size: bucket.size,
            });
        }
        Ok(Scorers {
            items,
            size: self.inner.size,
        })
    }
}

/// One collector per scorer of an order.
pub struct Collectors {
    items: Vec<Box<dyn Collector>>,
}

impl Collectors {
    /// Fan a visited field out to every collector.
    pub fn collect_field(&mut self, segment: &dyn SegmentReader, field: &dyn TermReader) {
        for collector in &mut self.items {
            collector.collect_field(segment, field);
        }
    }

    /// Fan a resolved term out to every collector.
    pub fn collect_term(&mut self, term_attrs: AttributeView<'_>) {
        for collector in &mut self.items {
            collector.collect_term(term_attrs);
        }
    }

    /// Per-scorer statistics, aligned with the order's buckets.
    pub fn finish(&self, index: &dyn IndexReader) -> Vec<ScoreStats> {
        self.items
            .iter()
            .map(|collector| collector.finish(index))
            .collect()
    }
}

struct PreparedScorer {
    ctx: Box<dyn ScoreCtx>,
    offset: usize,
    size: usize,
}

/// Per-segment scoring contexts, laid out like the order's buckets.
pub struct Scorers {
    items: Vec<PreparedScorer>,
    size: usize,
}

impl Scorers {
    /// Evaluate every scorer into its bucket of `dst`.
    pub fn evaluate_into(&self, dst: &mut [u8]) {
        for item in &self.items {
            item.ctx.score(&mut dst[item.offset..item.offset + item.size]);
        }
    }

    /// Size of the flat score buffer.
    pub fn score_size(&self) -> usize {
        self.size
    }

    /// Whether there is nothing to evaluate.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The score attribute of a document iterator.
///
/// Holds the flat score buffer and the evaluation closure; consumers call
/// [`evaluate`](Score::evaluate) only when they actually need the score, so
/// combinators can skip scoring entirely.
pub struct Score {
    buf: Vec<u8>,
    func: Option<Box<dyn Fn(&mut [u8])>>,
}

impl Score {
    /// A score of the given size with no evaluator; evaluation yields the
    /// zeroed buffer.
    pub fn unprepared(size: usize) -> Self {
        Score {
            buf: vec![0; size],
            func: None,
        }
    }

    /// A score evaluated by `func`.
    pub fn new(size: usize, func: Box<dyn Fn(&mut [u8])>) -> Self {
        Score {
            buf: vec![0; size],
            func: Some(func),
        }
    }

    /// Evaluate the current document's score and return the buffer.
    pub fn evaluate(&mut self) -> &[u8] {
        if let Some(func) = self.func.as_ref() {
            func(&mut self.buf);
        }
        &self.buf
    }

    /// Size of the score buffer.
    pub fn size(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Score {
    fn default() -> Self {
        Score::unprepared(0)
    }
}

impl Attribute for Score {
    fn clear(&mut self) {
        self.buf.fill(0);
    }
}

impl std::fmt::Debug for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Score")
            .field("size", &self.buf.len())
            .field("prepared", &self.func.is_some())
            .finish()
    }
}

/// Wraps an iterator, re-exposing its attributes plus a live [`Score`].
pub struct ScoredDocIterator {
    inner: Box<dyn DocIterator>,
    attrs: AttributeStore,
}

impl ScoredDocIterator {
    /// Score `inner` with prepared per-segment scorers.
    pub fn new(inner: Box<dyn DocIterator>, scorers: Scorers) -> Self {
        let mut attrs = AttributeStore::new();
        attrs.link_from(inner.attributes());
        attrs.emplace(Score::new(
            scorers.score_size(),
            Box::new(move |dst| scorers.evaluate_into(dst)),
        ));
        ScoredDocIterator { inner, attrs }
    }

    /// Give `inner` a constant score equal to `boost`.
    pub fn constant(inner: Box<dyn DocIterator>, order: &PreparedOrder, boost: Boost) -> Self {
        let mut attrs = AttributeStore::new();
        attrs.link_from(inner.attributes());
        let order = order.clone();
        let size = order.score_size();
        attrs.emplace(Score::new(
            size,
            Box::new(move |dst| order.constant(dst, boost)),
        ));
        ScoredDocIterator { inner, attrs }
    }
}

impl DocIterator for ScoredDocIterator {
    fn value(&self) -> DocId {
        self.inner.value()
    }

    fn next(&mut self) -> bool {
        self.inner.next()
    }

    fn seek(&mut self, target: DocId) -> DocId {
        self.inner.seek(target)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

/// Read an iterator's cost, defaulting to unbounded.
pub(crate) fn iterator_cost(it: &dyn DocIterator) -> u64 {
    Cost::extract(it.attributes(), u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::bm25::BM25;
    use crate::search::tfidf::TfIdf;

    fn f32_bucket(buf: &[u8]) -> f32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buf[..4]);
        f32::from_le_bytes(bytes)
    }

    #[test]
    fn test_order_layout() {
        let order = Order::new()
            .with(Box::new(BM25::default()))
            .with(Box::new(TfIdf::default()))
            .prepare();
        assert_eq!(order.score_size(), 8);
        assert!(!order.is_empty());
        assert!(order.features().contains(IndexFeatures::FREQ));
    }

    #[test]
    fn test_empty_order() {
        let order = PreparedOrder::empty();
        assert!(order.is_empty());
        assert_eq!(order.score_size(), 0);
        assert!(!order.less(&[], &[]));
    }

    #[test]
    fn test_composite_less_applies_scorer_by_scorer() {
        let order = Order::new()
            .with(Box::new(BM25::default()))
            .with(Box::new(TfIdf::default()))
            .prepare();

        let mut lo = vec![0u8; 8];
        let mut hi = vec![0u8; 8];
        lo[..4].copy_from_slice(&1.0f32.to_le_bytes());
        hi[..4].copy_from_slice(&1.0f32.to_le_bytes());
        lo[4..].copy_from_slice(&2.0f32.to_le_bytes());
        hi[4..].copy_from_slice(&3.0f32.to_le_bytes());

        // First buckets tie, second decides.
        assert!(order.less(&lo, &hi));
        assert!(!order.less(&hi, &lo));
        assert!(!order.less(&lo, &lo), "irreflexive");
    }

    #[test]
    fn test_add_scale_constant() {
        let order = Order::new().with(Box::new(BM25::default())).prepare();

        let mut dst = vec![0u8; 4];
        let mut src = vec![0u8; 4];
        order.constant(&mut src, 2.5);
        assert_eq!(f32_bucket(&src), 2.5);

        order.add(&mut dst, &src);
        order.add(&mut dst, &src);
        assert_eq!(f32_bucket(&dst), 5.0);

        order.scale(&mut dst, 0.5);
        assert_eq!(f32_bucket(&dst), 2.5);
    }

    #[test]
    fn test_score_lazy_evaluation() {
        use std::cell::Cell;
        use std::rc::Rc;

        let calls = Rc::new(Cell::new(0u32));
        let seen = calls.clone();
        let mut score = Score::new(
            4,
            Box::new(move |dst| {
                seen.set(seen.get() + 1);
                dst.copy_from_slice(&7.0f32.to_le_bytes());
            }),
        );

        assert_eq!(calls.get(), 0, "nothing evaluated until asked");
        assert_eq!(f32_bucket(score.evaluate()), 7.0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_unprepared_score_is_zero() {
        let mut score = Score::unprepared(4);
        assert_eq!(f32_bucket(score.evaluate()), 0.0);
    }
}
