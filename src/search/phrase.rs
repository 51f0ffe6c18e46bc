//! Positional phrase filter.

use std::any::Any;
use std::hash::Hasher;

use log::{debug, warn};

use crate::attribute::kinds::{Cost, Document, Frequency, Position};
use crate::attribute::{AttrRef, AttributeStore, AttributeView};
use crate::doc_id::{self, DocId};
use crate::error::Result;
use crate::index::field::IndexFeatures;
use crate::index::reader::IndexReader;
use crate::index::term::TermSeekResult;
use crate::iterator::DocIterator;
use crate::search::filter::{ExecutionContext, Filter, PreparedEmpty, PreparedFilter};
use crate::search::sort::{
    Boost, NO_BOOST, PreparedOrder, ScoredDocIterator, ScoreStats, iterator_cost,
};
use crate::util::bytes::BytesRef;

/// Matches documents containing a sequence of terms at consecutive
/// positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ByPhrase {
    field: String,
    terms: Vec<Vec<u8>>,
    boost: Boost,
}

impl ByPhrase {
    /// An empty phrase over `field`.
    pub fn new<F: Into<String>>(field: F) -> Self {
        ByPhrase {
            field: field.into(),
            terms: Vec::new(),
            boost: NO_BOOST,
        }
    }

    /// A phrase from a term sequence.
    pub fn from_terms<F: Into<String>, T: AsRef<[u8]>>(field: F, terms: &[T]) -> Self {
        let mut phrase = ByPhrase::new(field);
        for term in terms {
            phrase = phrase.push(term);
        }
        phrase
    }

    /// Append the next phrase term.
    pub fn push<T: AsRef<[u8]>>(mut self, term: T) -> Self {
        self.terms.push(term.as_ref().to_vec());
        self
    }

    /// Set the boost multiplier.
    pub fn with_boost(mut self, boost: Boost) -> Self {
        self.boost = boost;
        self
    }
}

impl Filter for ByPhrase {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        index: &dyn IndexReader,
        order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        if self.terms.is_empty() {
            return Ok(PreparedEmpty::boxed());
        }

        let mut collectors = order.collectors();
        let mut any_segment_has_all = false;
        for i in 0..index.segments_count() {
            let segment = index.segment(i);
            let Some(field) = segment.field(&self.field) else {
                continue;
            };
            if !field
                .features()
                .contains(IndexFeatures::FREQ | IndexFeatures::POSITION)
            {
                warn!(
                    "phrase filter needs positions; field '{}' lacks them",
                    self.field
                );
                continue;
            }
            collectors.collect_field(segment, field);

            let mut all_found = true;
            let mut terms = field.iterator();
            for term in &self.terms {
                if terms.seek(BytesRef::new(term)) == TermSeekResult::Found {
                    collectors.collect_term(terms.attributes());
                } else {
                    all_found = false;
                }
            }
            any_segment_has_all |= all_found;
        }

        if !any_segment_has_all {
            debug!("phrase filter resolves to nothing for field '{}'", self.field);
            return Ok(PreparedEmpty::boxed());
        }
        Ok(Box::new(PreparedPhrase {
            field: self.field.clone(),
            terms: self.terms.clone(),
            stats: collectors.finish(index),
            boost: boost * self.boost,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Filter) -> bool {
        other
            .as_any()
            .downcast_ref::<ByPhrase>()
            .is_some_and(|other| self == other)
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write(self.field.as_bytes());
        for term in &self.terms {
            state.write(term);
        }
        state.write_u32(self.boost.to_bits());
    }
}

struct PreparedPhrase {
    field: String,
    terms: Vec<Vec<u8>>,
    stats: Vec<ScoreStats>,
    boost: Boost,
}

impl PreparedFilter for PreparedPhrase {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>> {
        let Some(field) = ctx.segment.field(&self.field) else {
            return PreparedEmpty.execute(ctx);
        };
        let needed = IndexFeatures::FREQ | IndexFeatures::POSITION;
        if !field.features().contains(needed) {
            return PreparedEmpty.execute(ctx);
        }

        let mut subs = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            let mut terms = field.iterator();
            if terms.seek(BytesRef::new(term)) != TermSeekResult::Found {
                return PreparedEmpty.execute(ctx);
            }
            subs.push(terms.postings(needed)?);
        }

        let it: Box<dyn DocIterator> = Box::new(PhraseIterator::new(subs));
        let it: Box<dyn DocIterator> = if ctx.order.is_empty() {
            it
        } else {
            let scorers = ctx.order.prepare_scorers(
                ctx.segment,
                Some(field.meta()),
                &self.stats,
                self.boost,
                it.attributes(),
            )?;
            Box::new(ScoredDocIterator::new(it, scorers))
        };
        Ok(ctx.wrap(it))
    }
}

/// Conjunction over the phrase terms' postings with positional alignment.
///
/// Publishes the number of phrase occurrences in the current document as its
/// [`Frequency`].
struct PhraseIterator {
    subs: Vec<Box<dyn DocIterator>>,
    positions: Vec<AttrRef<Position>>,
    value: DocId,
    attrs: AttributeStore,
    doc: AttrRef<Document>,
    freq: AttrRef<Frequency>,
}

impl PhraseIterator {
    fn new(subs: Vec<Box<dyn DocIterator>>) -> Self {
        let positions = subs
            .iter()
            .filter_map(|sub| sub.attributes().get::<Position>())
            .collect();
        let cost = subs
            .iter()
            .map(|sub| iterator_cost(sub.as_ref()))
            .min()
            .unwrap_or(0);

        let mut attrs = AttributeStore::new();
        attrs.emplace(Cost { estimate: cost });
        let doc = attrs.emplace(Document::default());
        let freq = attrs.emplace(Frequency::default());
        PhraseIterator {
            subs,
            positions,
            value: doc_id::INVALID,
            attrs,
            doc,
            freq,
        }
    }

    fn settle(&mut self, value: DocId, freq: u64) -> DocId {
        self.value = value;
        self.doc.borrow_mut().value = value;
        self.freq.borrow_mut().value = freq;
        value
    }

    /// Drive every sub-iterator to agreement on a document `>= target`.
    fn align(&mut self, mut target: DocId) -> DocId {
        'outer: loop {
            if doc_id::is_eof(target) {
                return doc_id::EOF;
            }
            for i in 1..self.subs.len() {
                let got = self.subs[i].seek(target);
                if got != target {
                    target = if doc_id::is_eof(got) {
                        doc_id::EOF
                    } else {
                        self.subs[0].seek(got)
                    };
                    continue 'outer;
                }
            }
            return target;
        }
    }

    /// Count phrase occurrences in the current document.
    ///
    /// Position streams are freshly installed by the sub-iterators on every
    /// document advance and only move forward; when a follower overshoots,
    /// the lead catches up to the follower's implied base position.
    fn phrase_freq(&self) -> u64 {
        let mut freq = 0;
        let lead = &self.positions[0];
        let mut base = {
            let mut lead = lead.borrow_mut();
            if !lead.next() {
                return 0;
            }
            lead.value()
        };
        'outer: loop {
            for (k, follower) in self.positions.iter().enumerate().skip(1) {
                let target = base + k as u32;
                let got = follower.borrow_mut().seek(target);
                if got == Position::NO_MORE {
                    return freq;
                }
                if got != target {
                    let caught = lead.borrow_mut().seek(got - k as u32);
                    if caught == Position::NO_MORE {
                        return freq;
                    }
                    base = caught;
                    continue 'outer;
                }
            }
            freq += 1;
            let mut lead = lead.borrow_mut();
            if !lead.next() {
                return freq;
            }
            base = lead.value();
        }
    }

    /// Find the first aligned document `>= target` with at least one phrase
    /// occurrence.
    fn search_from(&mut self, mut target: DocId) -> DocId {
        loop {
            target = self.align(target);
            if doc_id::is_eof(target) {
                return self.settle(doc_id::EOF, 0);
            }
            let freq = self.phrase_freq();
            if freq > 0 {
                return self.settle(target, freq);
            }
            target = if self.subs[0].next() {
                self.subs[0].value()
            } else {
                doc_id::EOF
            };
        }
    }
}

impl DocIterator for PhraseIterator {
    fn value(&self) -> DocId {
        self.value
    }

    fn next(&mut self) -> bool {
        if doc_id::is_eof(self.value) {
            return false;
        }
        let target = if self.subs[0].next() {
            self.subs[0].value()
        } else {
            doc_id::EOF
        };
        !doc_id::is_eof(self.search_from(target))
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_id::is_eof(self.value) {
            return self.value;
        }
        if doc_id::valid(self.value) && target <= self.value {
            return self.value;
        }
        let lead = self.subs[0].seek(target);
        self.search_from(lead)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ArrayTokenStream;
    use crate::index::memory::{MemoryIndex, MemorySegmentWriter};

    fn features() -> IndexFeatures {
        IndexFeatures::FREQ | IndexFeatures::POSITION | IndexFeatures::NORM
    }

    fn index() -> MemoryIndex {
        let mut writer = MemorySegmentWriter::new();
        for terms in [
            ["the", "quick", "brown", "fox"].as_slice(),
            &["the", "brown", "quick", "fox"],
            &["quick", "brown", "cat", "quick", "brown"],
            &["brown", "quick"],
        ] {
            let mut doc = writer.insert();
            doc.index_field("body", features(), &mut ArrayTokenStream::from_terms(terms))
                .unwrap();
            doc.commit();
        }
        let mut index = MemoryIndex::new();
        index.add_segment(writer.build());
        index
    }

    fn drain(mut it: Box<dyn DocIterator>) -> Vec<DocId> {
        let mut out = Vec::new();
        while it.next() {
            out.push(it.value());
        }
        out
    }

    #[test]
    fn test_phrase_matches_adjacent_terms_only() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPhrase::from_terms("body", &["quick", "brown"])
            .prepare(&index, &order, NO_BOOST)
            .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        assert_eq!(drain(prepared.execute(&ctx).unwrap()), vec![1, 3]);
    }

    #[test]
    fn test_phrase_frequency_counts_occurrences() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPhrase::from_terms("body", &["quick", "brown"])
            .prepare(&index, &order, NO_BOOST)
            .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        let mut it = prepared.execute(&ctx).unwrap();

        let freq = it.attributes().get::<Frequency>().unwrap();
        assert!(it.next());
        assert_eq!(it.value(), 1);
        assert_eq!(freq.borrow().value, 1);
        assert!(it.next());
        assert_eq!(it.value(), 3);
        assert_eq!(freq.borrow().value, 2, "doc 3 holds the phrase twice");
    }

    #[test]
    fn test_three_term_phrase() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPhrase::from_terms("body", &["the", "quick", "brown"])
            .prepare(&index, &order, NO_BOOST)
            .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        assert_eq!(drain(prepared.execute(&ctx).unwrap()), vec![1]);
    }

    #[test]
    fn test_phrase_with_absent_term_is_empty() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPhrase::from_terms("body", &["quick", "zebra"])
            .prepare(&index, &order, NO_BOOST)
            .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        assert_eq!(drain(prepared.execute(&ctx).unwrap()), Vec::<DocId>::new());
    }

    #[test]
    fn test_phrase_seek() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPhrase::from_terms("body", &["quick", "brown"])
            .prepare(&index, &order, NO_BOOST)
            .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        let mut it = prepared.execute(&ctx).unwrap();
        assert_eq!(it.seek(2), 3);
        assert!(!it.next());
    }

    #[test]
    fn test_empty_phrase_prepares_to_empty() {
        let index = index();
        let order = PreparedOrder::empty();
        let prepared = ByPhrase::new("body")
            .prepare(&index, &order, NO_BOOST)
            .unwrap();
        let ctx = ExecutionContext::new(index.segment(0), &order);
        let mut it = prepared.execute(&ctx).unwrap();
        assert!(!it.next());
    }
}
