//! Filters and prepared queries.
//!
//! A filter is a tree describing a matching predicate. Preparing it against
//! an index snapshot resolves terms, gathers corpus statistics and yields an
//! executable plan; executing the plan against one segment yields a scored
//! document iterator. Unresolvable subtrees degrade to the empty prepared
//! query instead of failing the tree.

use std::any::Any;
use std::hash::{Hash, Hasher};

use crate::attribute::AttributeView;
use crate::attribute::kinds::{Cost, Document};
use crate::attribute::{AttrRef, AttributeStore};
use crate::doc_id::{self, DocId};
use crate::error::Result;
use crate::index::reader::{DocMask, IndexReader, SegmentReader};
use crate::iterator::{DocIterator, EmptyDocIterator};
use crate::search::cancellation::{Cancellation, CancellableDocIterator};
use crate::search::sort::{Boost, NO_BOOST, PreparedOrder, Score, ScoredDocIterator};

/// A query predicate tree node.
///
/// Every filter carries a boost multiplier and a runtime type identity;
/// equality and hashing are type-aware so identical subtrees deduplicate in
/// caches.
pub trait Filter: std::fmt::Debug {
    /// This filter's boost multiplier.
    fn boost(&self) -> Boost;

    /// Resolve the filter against an index snapshot into an executable
    /// plan. `boost` is the multiplier inherited from the enclosing tree.
    fn prepare(
        &self,
        index: &dyn IndexReader,
        order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>>;

    /// Runtime identity for type-aware equality.
    fn as_any(&self) -> &dyn Any;

    /// Type-aware equality.
    fn eq_dyn(&self, other: &dyn Filter) -> bool;

    /// Type-aware hashing of the node's content (the type identity itself
    /// is mixed in by the `Hash` impl).
    fn hash_dyn(&self, state: &mut dyn Hasher);
}

impl PartialEq for Box<dyn Filter> {
    fn eq(&self, other: &Self) -> bool {
        self.eq_dyn(other.as_ref())
    }
}

impl Eq for Box<dyn Filter> {}

impl Hash for Box<dyn Filter> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_any().type_id().hash(state);
        self.hash_dyn(state);
    }
}

/// Per-segment execution input: the segment, the prepared order and an
/// optional cancellation token.
pub struct ExecutionContext<'a> {
    pub segment: &'a dyn SegmentReader,
    pub order: &'a PreparedOrder,
    pub cancel: Cancellation,
}

impl<'a> ExecutionContext<'a> {
    /// A context without cancellation.
    pub fn new(segment: &'a dyn SegmentReader, order: &'a PreparedOrder) -> Self {
        ExecutionContext {
            segment,
            order,
            cancel: Cancellation::none(),
        }
    }

    /// Install a cancellation token.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Wrap `it` so it honors this context's cancellation token.
    pub fn wrap(&self, it: Box<dyn DocIterator>) -> Box<dyn DocIterator> {
        if self.cancel.is_active() {
            Box::new(CancellableDocIterator::new(it, self.cancel.clone()))
        } else {
            it
        }
    }
}

/// An executable query plan.
pub trait PreparedFilter {
    /// Produce the matching document iterator for one segment.
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>>;
}

/// The prepared query matching nothing; what unresolvable subtrees degrade
/// to.
#[derive(Debug, Default)]
pub struct PreparedEmpty;

impl PreparedEmpty {
    /// A boxed empty plan.
    pub fn boxed() -> Box<dyn PreparedFilter> {
        Box::new(PreparedEmpty)
    }
}

impl PreparedFilter for PreparedEmpty {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>> {
        Ok(ctx.wrap(Box::new(EmptyDocIterator::with_cost())))
    }
}

/// The filter matching no document.
#[derive(Debug, Clone, PartialEq)]
pub struct Empty {
    boost: Boost,
}

impl Empty {
    /// A new empty filter.
    pub fn new() -> Self {
        Empty { boost: NO_BOOST }
    }
}

impl Default for Empty {
    fn default() -> Self {
        Empty::new()
    }
}

impl Filter for Empty {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        _index: &dyn IndexReader,
        _order: &PreparedOrder,
        _boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        Ok(PreparedEmpty::boxed())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Filter) -> bool {
        other
            .as_any()
            .downcast_ref::<Empty>()
            .is_some_and(|other| self == other)
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write_u32(self.boost.to_bits());
    }
}

/// The filter matching every live document with a constant score.
#[derive(Debug, Clone, PartialEq)]
pub struct All {
    boost: Boost,
}

impl All {
    /// A new all filter.
    pub fn new() -> Self {
        All { boost: NO_BOOST }
    }

    /// Set the boost multiplier.
    pub fn with_boost(mut self, boost: Boost) -> Self {
        self.boost = boost;
        self
    }
}

impl Default for All {
    fn default() -> Self {
        All::new()
    }
}

impl Filter for All {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        _index: &dyn IndexReader,
        _order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        Ok(Box::new(PreparedAll {
            boost: boost * self.boost,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Filter) -> bool {
        other
            .as_any()
            .downcast_ref::<All>()
            .is_some_and(|other| self == other)
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write_u32(self.boost.to_bits());
    }
}

#[derive(Debug)]
struct PreparedAll {
    boost: Boost,
}

impl PreparedFilter for PreparedAll {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>> {
        let it = AllDocIterator::new(ctx.segment);
        let it: Box<dyn DocIterator> = if ctx.order.is_empty() {
            Box::new(it)
        } else {
            Box::new(ScoredDocIterator::constant(
                Box::new(it),
                ctx.order,
                self.boost,
            ))
        };
        Ok(ctx.wrap(it))
    }
}

/// Iterates every live document of a segment in order.
pub struct AllDocIterator {
    docs_count: u64,
    mask: Option<DocMask>,
    value: DocId,
    attrs: AttributeStore,
    doc: AttrRef<Document>,
}

impl AllDocIterator {
    /// Iterate the live documents of `segment`.
    pub fn new(segment: &dyn SegmentReader) -> Self {
        let mut attrs = AttributeStore::new();
        attrs.emplace(Cost {
            estimate: segment.live_docs_count(),
        });
        let doc = attrs.emplace(Document::default());
        AllDocIterator {
            docs_count: segment.docs_count(),
            mask: segment.doc_mask().cloned(),
            value: doc_id::INVALID,
            attrs,
            doc,
        }
    }

    fn settle(&mut self, mut candidate: u64) -> DocId {
        if let Some(mask) = &self.mask {
            while candidate <= self.docs_count && mask.contains(candidate as DocId) {
                candidate += 1;
            }
        }
        self.value = if candidate > self.docs_count {
            doc_id::EOF
        } else {
            candidate as DocId
        };
        self.doc.borrow_mut().value = self.value;
        self.value
    }
}

impl DocIterator for AllDocIterator {
    fn value(&self) -> DocId {
        self.value
    }

    fn next(&mut self) -> bool {
        if doc_id::is_eof(self.value) {
            return false;
        }
        let from = if doc_id::valid(self.value) {
            self.value as u64 + 1
        } else {
            doc_id::MIN as u64
        };
        !doc_id::is_eof(self.settle(from))
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_id::is_eof(self.value) {
            return self.value;
        }
        if doc_id::valid(self.value) && target <= self.value {
            return self.value;
        }
        if doc_id::is_eof(target) {
            self.value = doc_id::EOF;
            self.doc.borrow_mut().value = doc_id::EOF;
            return self.value;
        }
        self.settle(target.max(doc_id::MIN) as u64)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

/// Evaluate the score attribute of `it`, if it carries one.
///
/// Convenience for hosts consuming executed iterators.
pub fn evaluate_score(attrs: AttributeView<'_>) -> Option<Vec<u8>> {
    attrs
        .get::<Score>()
        .map(|score| score.borrow_mut().evaluate().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ArrayTokenStream;
    use crate::index::field::IndexFeatures;
    use crate::index::memory::{MemoryIndex, MemorySegmentWriter};

    fn three_doc_segment(mask: Option<DocId>) -> crate::index::memory::MemorySegment {
        let mut writer = MemorySegmentWriter::new();
        for terms in [["a"], ["b"], ["c"]] {
            let mut doc = writer.insert();
            doc.index_field(
                "body",
                IndexFeatures::FREQ,
                &mut ArrayTokenStream::from_terms(&terms),
            )
            .unwrap();
            doc.commit();
        }
        if let Some(doc) = mask {
            writer.mask(doc);
        }
        writer.build()
    }

    #[test]
    fn test_empty_filter_executes_to_eof() {
        let mut index = MemoryIndex::new();
        index.add_segment(three_doc_segment(None));
        let order = PreparedOrder::empty();

        let prepared = Empty::new().prepare(&index, &order, NO_BOOST).unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        let mut it = prepared.execute(&ctx).unwrap();

        assert!(doc_id::is_eof(it.value()));
        assert!(!it.next());
        assert_eq!(Cost::extract(it.attributes(), u64::MAX), 0);
    }

    #[test]
    fn test_all_filter_walks_live_docs() {
        let mut index = MemoryIndex::new();
        index.add_segment(three_doc_segment(Some(2)));
        let order = PreparedOrder::empty();

        let prepared = All::new().prepare(&index, &order, NO_BOOST).unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        let mut it = prepared.execute(&ctx).unwrap();

        assert_eq!(Cost::extract(it.attributes(), 0), 2);
        let mut seen = Vec::new();
        while it.next() {
            seen.push(it.value());
        }
        assert_eq!(seen, vec![1, 3]);
    }

    #[test]
    fn test_all_iterator_seek() {
        let mut index = MemoryIndex::new();
        index.add_segment(three_doc_segment(None));
        let segment = index.segment(0);

        let mut it = AllDocIterator::new(segment);
        assert_eq!(it.seek(2), 2);
        assert_eq!(it.seek(1), 2, "seek never moves backward");
        assert_eq!(it.seek(doc_id::EOF), doc_id::EOF);
    }

    #[test]
    fn test_filter_equality_is_type_aware() {
        let all: Box<dyn Filter> = Box::new(All::new());
        let all2: Box<dyn Filter> = Box::new(All::new());
        let boosted: Box<dyn Filter> = Box::new(All::new().with_boost(2.0));
        let empty: Box<dyn Filter> = Box::new(Empty::new());

        assert!(PartialEq::eq(&all, &all2));
        assert!(!PartialEq::eq(&all, &boosted));
        assert!(!PartialEq::eq(&all, &empty));

        use std::collections::hash_map::DefaultHasher;
        let hash = |f: &Box<dyn Filter>| {
            let mut hasher = DefaultHasher::new();
            f.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&all), hash(&all2));
        assert_ne!(hash(&all), hash(&empty));
    }
}
