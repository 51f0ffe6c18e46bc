//! Boolean filter tree.

use std::any::Any;
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use log::debug;

use crate::attribute::kinds::Document;
use crate::attribute::{AttributeStore, AttributeView};
use crate::doc_id::{self, DocId};
use crate::error::Result;
use crate::index::reader::IndexReader;
use crate::iterator::DocIterator;
use crate::search::conjunction::conjunction;
use crate::search::disjunction::{disjunction, min_match_disjunction};
use crate::search::exclusion::exclusion;
use crate::search::filter::{ExecutionContext, Filter, PreparedEmpty, PreparedFilter};
use crate::search::sort::{Boost, NO_BOOST, PreparedOrder, Score};

/// Occurrence requirement of a boolean clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    /// The clause must match.
    Must,
    /// The clause may match; matching adds to the score.
    Should,
    /// The clause must not match.
    MustNot,
    /// The clause must match but never contributes to scoring.
    Filter,
}

/// One clause of a [`BooleanFilter`].
#[derive(Debug)]
pub struct BooleanClause {
    /// The clause predicate.
    pub filter: Box<dyn Filter>,
    /// The occurrence requirement.
    pub occur: Occur,
}

impl PartialEq for BooleanClause {
    fn eq(&self, other: &Self) -> bool {
        self.occur == other.occur && self.filter.eq_dyn(other.filter.as_ref())
    }
}

/// Combines sub-filters with boolean logic.
///
/// Must and filter clauses intersect, should clauses union (with optional
/// K-of-N `min_match`), must-not clauses exclude. With both must and should
/// clauses present and `min_match == 0`, should clauses only contribute
/// score.
#[derive(Debug)]
pub struct BooleanFilter {
    clauses: Vec<BooleanClause>,
    min_match: usize,
    boost: Boost,
}

impl Default for BooleanFilter {
    fn default() -> Self {
        BooleanFilter::new()
    }
}

impl BooleanFilter {
    /// An empty boolean filter.
    pub fn new() -> Self {
        BooleanFilter {
            clauses: Vec::new(),
            min_match: 0,
            boost: NO_BOOST,
        }
    }

    /// Add a clause.
    pub fn add(&mut self, filter: Box<dyn Filter>, occur: Occur) {
        self.clauses.push(BooleanClause { filter, occur });
    }

    /// Add a MUST clause, chaining.
    pub fn must(mut self, filter: Box<dyn Filter>) -> Self {
        self.add(filter, Occur::Must);
        self
    }

    /// Add a SHOULD clause, chaining.
    pub fn should(mut self, filter: Box<dyn Filter>) -> Self {
        self.add(filter, Occur::Should);
        self
    }

    /// Add a MUST_NOT clause, chaining.
    pub fn must_not(mut self, filter: Box<dyn Filter>) -> Self {
        self.add(filter, Occur::MustNot);
        self
    }

    /// Add a non-scoring FILTER clause, chaining.
    pub fn filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.add(filter, Occur::Filter);
        self
    }

    /// Require at least `min_match` should clauses to match.
    pub fn with_min_match(mut self, min_match: usize) -> Self {
        self.min_match = min_match;
        self
    }

    /// Set the boost multiplier.
    pub fn with_boost(mut self, boost: Boost) -> Self {
        self.boost = boost;
        self
    }

    /// The clauses of this filter.
    pub fn clauses(&self) -> &[BooleanClause] {
        &self.clauses
    }

    /// Whether the filter has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl Filter for BooleanFilter {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        index: &dyn IndexReader,
        order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        if self.clauses.is_empty() {
            return Ok(PreparedEmpty::boxed());
        }
        let outer = boost * self.boost;
        let unscored = PreparedOrder::empty();

        let mut musts = Vec::new();
        let mut filters = Vec::new();
        let mut shoulds = Vec::new();
        let mut must_nots = Vec::new();
        for clause in &self.clauses {
            match clause.occur {
                Occur::Must => musts.push(clause.filter.prepare(index, order, outer)?),
                Occur::Should => shoulds.push(clause.filter.prepare(index, order, outer)?),
                Occur::Filter => {
                    filters.push(clause.filter.prepare(index, &unscored, NO_BOOST)?)
                }
                Occur::MustNot => {
                    must_nots.push(clause.filter.prepare(index, &unscored, NO_BOOST)?)
                }
            }
        }

        if musts.is_empty() && filters.is_empty() && shoulds.is_empty() {
            debug!("boolean filter with only negative clauses matches nothing");
            return Ok(PreparedEmpty::boxed());
        }
        Ok(Box::new(PreparedBoolean {
            musts,
            filters,
            shoulds,
            must_nots,
            min_match: self.min_match,
            unscored,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Filter) -> bool {
        other.as_any().downcast_ref::<BooleanFilter>().is_some_and(|other| {
            self.clauses == other.clauses
                && self.min_match == other.min_match
                && self.boost == other.boost
        })
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write_usize(self.clauses.len());
        for clause in &self.clauses {
            state.write_u8(match clause.occur {
                Occur::Must => 0,
                Occur::Should => 1,
                Occur::MustNot => 2,
                Occur::Filter => 3,
            });
            let mut state = &mut *state;
            clause.filter.as_any().type_id().hash(&mut state);
            clause.filter.hash_dyn(state);
        }
        state.write_usize(self.min_match);
        state.write_u32(self.boost.to_bits());
    }
}

struct PreparedBoolean {
    musts: Vec<Box<dyn PreparedFilter>>,
    filters: Vec<Box<dyn PreparedFilter>>,
    shoulds: Vec<Box<dyn PreparedFilter>>,
    must_nots: Vec<Box<dyn PreparedFilter>>,
    min_match: usize,
    unscored: PreparedOrder,
}

impl PreparedFilter for PreparedBoolean {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>> {
        // Children execute without the cancellation token; the composed
        // iterator polls it once at the top.
        let scored_ctx = ExecutionContext::new(ctx.segment, ctx.order);
        let unscored_ctx = ExecutionContext::new(ctx.segment, &self.unscored);

        let mut required = Vec::with_capacity(self.musts.len() + self.filters.len());
        for prepared in &self.musts {
            required.push(prepared.execute(&scored_ctx)?);
        }
        for prepared in &self.filters {
            required.push(prepared.execute(&unscored_ctx)?);
        }
        let mut optional = Vec::with_capacity(self.shoulds.len());
        for prepared in &self.shoulds {
            optional.push(prepared.execute(&scored_ctx)?);
        }

        let positive: Box<dyn DocIterator> = match (required.is_empty(), optional.is_empty()) {
            (true, true) => return PreparedEmpty.execute(ctx),
            (false, true) => conjunction(required, ctx.order),
            (true, false) => {
                min_match_disjunction(optional, self.min_match.max(1), ctx.order)
            }
            (false, false) => {
                if self.min_match > 0 {
                    required.push(min_match_disjunction(optional, self.min_match, ctx.order));
                    conjunction(required, ctx.order)
                } else {
                    Box::new(OptionalScoreIterator::new(
                        conjunction(required, ctx.order),
                        disjunction(optional, ctx.order),
                        ctx.order,
                    ))
                }
            }
        };

        let it = if self.must_nots.is_empty() {
            positive
        } else {
            let mut negatives = Vec::with_capacity(self.must_nots.len());
            for prepared in &self.must_nots {
                negatives.push(prepared.execute(&unscored_ctx)?);
            }
            exclusion(positive, disjunction(negatives, &self.unscored))
        };
        Ok(ctx.wrap(it))
    }
}

/// Matches the required iterator; a should-side iterator contributes score
/// when it covers the same document.
///
/// The optional side is only advanced during score evaluation, keeping
/// scoring fully lazy.
struct OptionalScoreIterator {
    required: Box<dyn DocIterator>,
    attrs: AttributeStore,
}

impl OptionalScoreIterator {
    fn new(
        required: Box<dyn DocIterator>,
        optional: Box<dyn DocIterator>,
        order: &PreparedOrder,
    ) -> Self {
        let mut attrs = AttributeStore::new();
        attrs.link_from(required.attributes());

        if !order.is_empty() {
            let required_score = required.attributes().get::<Score>();
            let required_doc = required.attributes().get::<Document>();
            let optional = Rc::new(RefCell::new(optional));
            let order = order.clone();
            attrs.emplace(Score::new(
                order.score_size(),
                Box::new(move |dst| {
                    dst.fill(0);
                    if let Some(score) = &required_score {
                        order.add(dst, score.borrow_mut().evaluate());
                    }
                    let Some(doc) = &required_doc else {
                        return;
                    };
                    let value = doc.borrow().value;
                    if !doc_id::valid(value) || doc_id::is_eof(value) {
                        return;
                    }
                    let mut optional = optional.borrow_mut();
                    if optional.value() < value {
                        optional.seek(value);
                    }
                    if optional.value() == value
                        && let Some(score) = optional.attributes().get::<Score>()
                    {
                        order.add(dst, score.borrow_mut().evaluate());
                    }
                }),
            ));
        }
        OptionalScoreIterator { required, attrs }
    }
}

impl DocIterator for OptionalScoreIterator {
    fn value(&self) -> DocId {
        self.required.value()
    }

    fn next(&mut self) -> bool {
        self.required.next()
    }

    fn seek(&mut self, target: DocId) -> DocId {
        self.required.seek(target)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}
