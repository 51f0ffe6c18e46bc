//! Filter matching documents with a value in a named column.

use std::any::Any;
use std::hash::Hasher;

use log::debug;

use crate::doc_id::{self, DocId};
use crate::error::Result;
use crate::index::reader::IndexReader;
use crate::iterator::DocIterator;
use crate::iterator::bitset::BitsetDocIterator;
use crate::search::filter::{ExecutionContext, Filter, PreparedEmpty, PreparedFilter};
use crate::search::sort::{Boost, NO_BOOST, PreparedOrder, ScoredDocIterator};
use crate::util::bitset::BitSet;

/// Matches every live document that stores a value in the named column.
#[derive(Debug, Clone, PartialEq)]
pub struct ByColumn {
    column: String,
    boost: Boost,
}

impl ByColumn {
    /// A column-existence filter.
    pub fn new<C: Into<String>>(column: C) -> Self {
        ByColumn {
            column: column.into(),
            boost: NO_BOOST,
        }
    }

    /// Set the boost multiplier.
    pub fn with_boost(mut self, boost: Boost) -> Self {
        self.boost = boost;
        self
    }
}

impl Filter for ByColumn {
    fn boost(&self) -> Boost {
        self.boost
    }

    fn prepare(
        &self,
        index: &dyn IndexReader,
        _order: &PreparedOrder,
        boost: Boost,
    ) -> Result<Box<dyn PreparedFilter>> {
        let known = (0..index.segments_count())
            .any(|i| index.segment(i).column_named(&self.column).is_some());
        if !known {
            debug!("column filter resolves to nothing for '{}'", self.column);
            return Ok(PreparedEmpty::boxed());
        }
        Ok(Box::new(PreparedColumn {
            column: self.column.clone(),
            boost: boost * self.boost,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Filter) -> bool {
        other
            .as_any()
            .downcast_ref::<ByColumn>()
            .is_some_and(|other| self == other)
    }

    fn hash_dyn(&self, state: &mut dyn Hasher) {
        state.write(self.column.as_bytes());
        state.write_u32(self.boost.to_bits());
    }
}

struct PreparedColumn {
    column: String,
    boost: Boost,
}

impl PreparedFilter for PreparedColumn {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Box<dyn DocIterator>> {
        let Some(column) = ctx.segment.column_named(&self.column) else {
            return PreparedEmpty.execute(ctx);
        };

        let docs_count = ctx.segment.docs_count();
        let mask = ctx.segment.doc_mask();
        let mut bits = BitSet::new(docs_count as usize);
        for doc in doc_id::MIN as u64..=docs_count {
            let doc = doc as DocId;
            if column.value(doc).is_some() && !mask.is_some_and(|mask| mask.contains(doc)) {
                bits.set((doc - doc_id::MIN) as usize);
            }
        }

        let it: Box<dyn DocIterator> = Box::new(BitsetDocIterator::from_owned(bits));
        let it: Box<dyn DocIterator> = if ctx.order.is_empty() {
            it
        } else {
            Box::new(ScoredDocIterator::constant(it, ctx.order, self.boost))
        };
        Ok(ctx.wrap(it))
    }
}
