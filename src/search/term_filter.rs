//! Filter matching documents containing an exact term.

use std::any::Any;
use std::hash::Hasher;

use log::debug;

use crate::error::Result;
use crate::index::reader::IndexReader;
use crate::index::term::TermSeekResult;
use crate::iterator::DocIterator;
use crate::search::filter::{
    ExecutionContext, Filter, PreparedEmpty, PreparedFilter,
};
use crate::search::sort::{Boost, NO_BOOST, PreparedOrder, ScoredDocIterator, ScoreStats};
use crate::util::bytes::BytesRef;

/// Matches documents containing `term` in `field`.
#[derive(Debug, Clone, PartialEq)]
pub struct ByTerm {
    field: String,
    term: Vec<u8>,
    boost: Boost,
}

impl ByTerm {
    /// A term filter over `field`.
    pub fn new<F: Into<String>, T: AsRef<[u8]>>(field: F, term: T) -> Self {
        ByTerm {
            field: field.into(),
            term: term.as_ref().to_vec(),
            boost: NO_BOOST,
        }
    }

    /// Set the boost multiplier.
    pub fn with_boost(mut self, boost: Boost) -> Self {
        self.boost = boost;
        self
    }

    /// The queried field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The queried term bytes.
    pub fn term(&self) -> &[u8] {
        &self.term
    }
}

impl Filter for ByTerm {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        index: &dyn IndexReader,
        order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        let mut collectors = order.collectors();
        let mut found = false;
        for i in 0..index.segments_count() {
            let segment = index.segment(i);
            if let Some(field) = segment.field(&self.field) {
                collectors.collect_field(segment, field);
                let mut terms = field.iterator();
                if terms.seek(BytesRef::new(&self.term)) == TermSeekResult::Found {
                    collectors.collect_term(terms.attributes());
                    found = true;
                }
            }
        }
        if !found {
            debug!(
                "term filter resolves to nothing for field '{}'",
                self.field
            );
            return Ok(PreparedEmpty::boxed());
        }
        Ok(Box::new(PreparedTerm {
            field: self.field.clone(),
            term: self.term.clone(),
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
            .downcast_ref::<ByTerm>()
            .is_some_and(|other| self == other)
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write(self.field.as_bytes());
        state.write(&self.term);
        state.write_u32(self.boost.to_bits());
    }
}

struct PreparedTerm {
    field: String,
    term: Vec<u8>,
    stats: Vec<ScoreStats>,
    boost: Boost,
}

impl PreparedFilter for PreparedTerm {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>> {
        let Some(field) = ctx.segment.field(&self.field) else {
            return PreparedEmpty.execute(ctx);
        };
        let mut terms = field.iterator();
        if terms.seek(BytesRef::new(&self.term)) != TermSeekResult::Found {
            return PreparedEmpty.execute(ctx);
        }

        let features = ctx.order.features().intersection(field.features());
        let postings = terms.postings(features)?;
        let it: Box<dyn DocIterator> = if ctx.order.is_empty() {
            postings
        } else {
            let scorers = ctx.order.prepare_scorers(
                ctx.segment,
                Some(field.meta()),
                &self.stats,
                self.boost,
                postings.attributes(),
            )?;
            Box::new(ScoredDocIterator::new(postings, scorers))
        };
        Ok(ctx.wrap(it))
    }
}
