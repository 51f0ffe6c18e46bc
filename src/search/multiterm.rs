//! Prefix and range filters.
//!
//! Both resolve to a span of terms within one field; execution ORs the
//! matching postings into a bitset and iterates that, so the result carries
//! a cost equal to the number of matching live documents and a constant
//! score.

use std::any::Any;
use std::hash::Hasher;
use std::ops::Bound;

use log::debug;

use crate::doc_id;
use crate::error::Result;
use crate::index::field::IndexFeatures;
use crate::index::reader::IndexReader;
use crate::index::term::{SeekTermIterator, TermReader, TermSeekResult};
use crate::iterator::DocIterator;
use crate::iterator::bitset::BitsetDocIterator;
use crate::search::filter::{ExecutionContext, Filter, PreparedEmpty, PreparedFilter};
use crate::search::sort::{Boost, NO_BOOST, PreparedOrder, ScoredDocIterator};
use crate::util::bitset::BitSet;
use crate::util::bytes::BytesRef;

/// A contiguous span of terms within a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TermSpan {
    Prefix(Vec<u8>),
    Range {
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    },
}

impl TermSpan {
    fn hash_into(&self, state: &mut dyn Hasher) {
        fn hash_bound(state: &mut dyn Hasher, bound: &Bound<Vec<u8>>) {
            match bound {
                Bound::Unbounded => state.write_u8(0),
                Bound::Included(bytes) => {
                    state.write_u8(1);
                    state.write(bytes);
                }
                Bound::Excluded(bytes) => {
                    state.write_u8(2);
                    state.write(bytes);
                }
            }
        }
        match self {
            TermSpan::Prefix(prefix) => {
                state.write_u8(1);
                state.write(prefix);
            }
            TermSpan::Range { lower, upper } => {
                state.write_u8(2);
                hash_bound(state, lower);
                hash_bound(state, upper);
            }
        }
    }

    /// Visit every term of the span, in order.
    fn visit(
        &self,
        reader: &dyn TermReader,
        mut visitor: impl FnMut(&dyn SeekTermIterator) -> Result<()>,
    ) -> Result<()> {
        let mut terms = reader.iterator();

        // Position on the first candidate.
        let positioned = match self.lower() {
            Bound::Unbounded => terms.next(),
            Bound::Included(from) => terms.seek(BytesRef::new(from)) != TermSeekResult::NotFoundLess,
            Bound::Excluded(from) => match terms.seek(BytesRef::new(from)) {
                TermSeekResult::NotFoundLess => false,
                TermSeekResult::Found => terms.next(),
                TermSeekResult::NotFoundGreater => true,
            },
        };
        if !positioned {
            return Ok(());
        }

        loop {
            if !self.accepts(terms.value()) {
                return Ok(());
            }
            visitor(terms.as_ref())?;
            if !terms.next() {
                return Ok(());
            }
        }
    }

    fn lower(&self) -> Bound<&Vec<u8>> {
        match self {
            TermSpan::Prefix(prefix) => Bound::Included(prefix),
            TermSpan::Range { lower, .. } => lower.as_ref(),
        }
    }

    fn accepts(&self, term: BytesRef<'_>) -> bool {
        match self {
            TermSpan::Prefix(prefix) => term.starts_with(BytesRef::new(prefix)),
            TermSpan::Range { upper, .. } => match upper {
                Bound::Unbounded => true,
                Bound::Included(to) => term <= BytesRef::new(to),
                Bound::Excluded(to) => term < BytesRef::new(to),
            },
        }
    }
}

/// Matches documents containing any term starting with a prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ByPrefix {
    field: String,
    prefix: Vec<u8>,
    boost: Boost,
}

impl ByPrefix {
    /// A prefix filter over `field`.
    pub fn new<F: Into<String>, T: AsRef<[u8]>>(field: F, prefix: T) -> Self {
        ByPrefix {
            field: field.into(),
            prefix: prefix.as_ref().to_vec(),
            boost: NO_BOOST,
        }
    }

    /// Set the boost multiplier.
    pub fn with_boost(mut self, boost: Boost) -> Self {
        self.boost = boost;
        self
    }
}

impl Filter for ByPrefix {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        index: &dyn IndexReader,
        order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        prepare_multiterm(
            index,
            order,
            &self.field,
            TermSpan::Prefix(self.prefix.clone()),
            boost * self.boost,
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Filter) -> bool {
        other
            .as_any()
            .downcast_ref::<ByPrefix>()
            .is_some_and(|other| self == other)
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write(self.field.as_bytes());
        state.write(&self.prefix);
        state.write_u32(self.boost.to_bits());
    }
}

/// Matches documents containing any term within a byte range.
#[derive(Debug, Clone, PartialEq)]
pub struct ByRange {
    field: String,
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    boost: Boost,
}

impl ByRange {
    /// A range filter over `field`.
    pub fn new<F: Into<String>>(field: F, lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> Self {
        ByRange {
            field: field.into(),
            lower,
            upper,
            boost: NO_BOOST,
        }
    }

    /// Set the boost multiplier.
    pub fn with_boost(mut self, boost: Boost) -> Self {
        self.boost = boost;
        self
    }
}

impl Filter for ByRange {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        index: &dyn IndexReader,
        order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        prepare_multiterm(
            index,
            order,
            &self.field,
            TermSpan::Range {
                lower: self.lower.clone(),
                upper: self.upper.clone(),
            },
            boost * self.boost,
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Filter) -> bool {
        other
            .as_any()
            .downcast_ref::<ByRange>()
            .is_some_and(|other| self == other)
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write(self.field.as_bytes());
        TermSpan::Range {
            lower: self.lower.clone(),
            upper: self.upper.clone(),
        }
        .hash_into(state);
        state.write_u32(self.boost.to_bits());
    }
}

fn prepare_multiterm(
    index: &dyn IndexReader,
    _order: &PreparedOrder,
    field_name: &str,
    span: TermSpan,
    boost: Boost,
) -> Result<Box<dyn PreparedFilter>> {
    // Matches score constantly, so no corpus statistics are gathered; the
    // walk only decides whether the whole filter degrades to empty.
    let mut matched = 0usize;
    for i in 0..index.segments_count() {
        let segment = index.segment(i);
        if let Some(field) = segment.field(field_name) {
            span.visit(field, |_| {
                matched += 1;
                Ok(())
            })?;
        }
    }
    if matched == 0 {
        debug!("multiterm filter resolves to nothing for field '{field_name}'");
        return Ok(PreparedEmpty::boxed());
    }
    Ok(Box::new(PreparedMultiterm {
        field: field_name.to_string(),
        span,
        boost,
    }))
}

struct PreparedMultiterm {
    field: String,
    span: TermSpan,
    boost: Boost,
}

impl PreparedFilter for PreparedMultiterm {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>> {
        let Some(field) = ctx.segment.field(&self.field) else {
            return PreparedEmpty.execute(ctx);
        };

        let mut bits = BitSet::new(ctx.segment.docs_count() as usize);
        self.span.visit(field, |terms| {
            let mut postings = terms.postings(IndexFeatures::NONE)?;
            while postings.next() {
                bits.set((postings.value() - doc_id::MIN) as usize);
            }
            Ok(())
        })?;

        let it: Box<dyn DocIterator> = Box::new(BitsetDocIterator::from_owned(bits));
        let it: Box<dyn DocIterator> = if ctx.order.is_empty() {
            it
        } else {
            Box::new(ScoredDocIterator::constant(it, ctx.order, self.boost))
        };
        Ok(ctx.wrap(it))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ArrayTokenStream;
    use crate::attribute::kinds::Cost;
    use crate::index::memory::{MemoryIndex, MemorySegmentWriter};

    fn index() -> MemoryIndex {
        let mut writer = MemorySegmentWriter::new();
        for terms in [
            ["apple", "apricot"].as_slice(),
            &["banana"],
            &["apex", "banana"],
            &["cherry"],
        ] {
            let mut doc = writer.insert();
            doc.index_field(
                "body",
                IndexFeatures::FREQ,
                &mut ArrayTokenStream::from_terms(terms),
            )
            .unwrap();
            doc.commit();
        }
        let mut index = MemoryIndex::new();
        index.add_segment(writer.build());
        index
    }

    fn drain(mut it: Box<dyn DocIterator>) -> Vec<crate::doc_id::DocId> {
        let mut out = Vec::new();
        while it.next() {
            out.push(it.value());
        }
        out
    }

    #[test]
    fn test_prefix_matches_and_cost() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPrefix::new("body", "ap")
            .prepare(&index, &order, NO_BOOST)
            .unwrap();

        let ctx = ExecutionContext::new(index.segment(0), &order);
        let it = prepared.execute(&ctx).unwrap();
        assert_eq!(Cost::extract(it.attributes(), 0), 2);
        assert_eq!(drain(it), vec![1, 3]);
    }

    #[test]
    fn test_prefix_without_matches() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPrefix::new("body", "zz")
            .prepare(&index, &order, NO_BOOST)
            .unwrap();

        let ctx = ExecutionContext::new(index.segment(0), &order);
        let mut it = prepared.execute(&ctx).unwrap();
        assert!(!it.next());
    }

    #[test]
    fn test_range_inclusive_exclusive() {
        let index = index();
        let order = PreparedOrder::empty();

        // ["apex", "banana") covers apex, apple, apricot.
        let prepared = ByRange::new(
            "body",
            Bound::Included(b"apex".to_vec()),
            Bound::Excluded(b"banana".to_vec()),
        )
        .prepare(&index, &order, NO_BOOST)
        .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        assert_eq!(drain(prepared.execute(&ctx).unwrap()), vec![1, 3]);

        // (apple, banana] covers apricot, banana.
        let prepared = ByRange::new(
            "body",
            Bound::Excluded(b"apple".to_vec()),
            Bound::Included(b"banana".to_vec()),
        )
        .prepare(&index, &order, NO_BOOST)
        .unwrap();
        assert_eq!(drain(prepared.execute(&ctx).unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn test_range_unbounded() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByRange::new("body", Bound::Unbounded, Bound::Unbounded)
            .prepare(&index, &order, NO_BOOST)
            .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        assert_eq!(drain(prepared.execute(&ctx).unwrap()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_filter_identity() {
        let a = ByPrefix::new("body", "ap");
        let b = ByPrefix::new("body", "ap");
        let range = ByRange::new("body", Bound::Unbounded, Bound::Unbounded);
        assert!(a.eq_dyn(&b));
        assert!(!a.eq_dyn(&range));
    }
}
