//! Document iterator contract.
//!
//! A document iterator is a lazily evaluated, strictly increasing stream of
//! document ids with an attached attribute view. Everything the search side
//! produces — postings, bitset scans, combinators, scored execution results —
//! speaks this one interface, so combinators compose over
//! `Box<dyn DocIterator>` without knowing what feeds them.

use crate::attribute::{AttributeStore, AttributeView};
use crate::attribute::kinds::{Cost, Position};
use crate::doc_id::{self, DocId};

pub mod bitset;

/// A forward-only stream of matching document ids.
///
/// # Contract
///
/// - Before the first `next`/`seek`, `value()` is not a valid id.
/// - `next` advances to the next matching id and returns `true`, or settles
///   on [`doc_id::EOF`] and returns `false`; `EOF` is absorbing.
/// - `seek(target)` advances to the first matching id `>= target` and
///   returns it; it never moves backward, so `seek(t)` with `t <= value()`
///   returns the current value. `seek(EOF)` yields `EOF`.
/// - Emitted values form a strictly increasing sequence terminating at
///   `EOF`.
/// - The attribute view is stable for the iterator's lifetime; attribute
///   values may change on every advance.
pub trait DocIterator {
    /// The current document id.
    fn value(&self) -> DocId;

    /// Advance to the next matching document.
    fn next(&mut self) -> bool;

    /// Advance to the first matching document with id `>= target`.
    ///
    /// The default implementation drives [`next`](Self::next); concrete
    /// iterators override it with skip support where the backing data
    /// allows.
    fn seek(&mut self, target: DocId) -> DocId {
        // From the pre-first state any seek, including seek(INVALID),
        // advances onto an actual document.
        if self.value() == doc_id::INVALID && !self.next() {
            return self.value();
        }
        while self.value() < target {
            if !self.next() {
                break;
            }
        }
        self.value()
    }

    /// The attributes published by this iterator.
    fn attributes(&self) -> AttributeView<'_>;
}

/// An iterator producing no documents at all.
///
/// The plain form exposes an empty attribute view; [`with_cost`] attaches a
/// zero cost estimate for consumers that schedule by cost.
///
/// [`with_cost`]: EmptyDocIterator::with_cost
#[derive(Debug, Default)]
pub struct EmptyDocIterator {
    attrs: AttributeStore,
}

impl EmptyDocIterator {
    /// An empty iterator with an empty attribute view.
    pub fn new() -> Self {
        EmptyDocIterator::default()
    }

    /// An empty iterator publishing `cost == 0`.
    pub fn with_cost() -> Self {
        let mut attrs = AttributeStore::new();
        attrs.emplace(Cost { estimate: 0 });
        EmptyDocIterator { attrs }
    }
}

impl DocIterator for EmptyDocIterator {
    fn value(&self) -> DocId {
        doc_id::EOF
    }

    fn next(&mut self) -> bool {
        false
    }

    fn seek(&mut self, _target: DocId) -> DocId {
        doc_id::EOF
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

/// A boxed empty iterator.
pub fn empty() -> Box<dyn DocIterator> {
    Box::new(EmptyDocIterator::new())
}

/// Skewed position ordering: `a` sorts before `b` iff `a + 1 < b + 1` under
/// wrapping arithmetic.
///
/// This makes [`Position::INVALID`] (the pre-first state) the least element,
/// so seeking to position 0 from a fresh position stream works.
#[inline]
pub fn skewed_less(a: u32, b: u32) -> bool {
    a.wrapping_add(1) < b.wrapping_add(1)
}

/// A stream of term positions within the current document.
///
/// The domain is `u32` with [`Position::INVALID`] as the pre-first sentinel
/// and [`Position::NO_MORE`] as the terminal value. An exhausted stream must
/// report `NO_MORE` from `value`.
pub trait PositionIterator {
    /// The current position.
    fn value(&self) -> u32;

    /// Advance to the next position.
    fn next(&mut self) -> bool;

    /// Advance to the first position `>= target` under the skewed ordering.
    ///
    /// [`Position::INVALID`] is never a result: from the pre-first state the
    /// iterator advances onto an actual position (or `NO_MORE`) even when
    /// the target is `INVALID` itself.
    fn seek(&mut self, target: u32) -> u32 {
        if self.value() == Position::INVALID && !self.next() {
            return self.value();
        }
        while skewed_less(self.value(), target) {
            if !self.next() {
                break;
            }
        }
        self.value()
    }

    /// Per-position attributes (offsets, payloads).
    fn attributes(&self) -> AttributeView<'_>;
}
