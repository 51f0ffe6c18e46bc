//! Ordered term traversal within a field.

use crate::attribute::{Attribute, AttributeView};
use crate::error::Result;
use crate::index::field::{FieldInfo, FieldStats, IndexFeatures};
use crate::iterator::DocIterator;
use crate::util::bytes::BytesRef;

/// Per-term metadata published through a term iterator's attribute view.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermMeta {
    /// Number of documents containing the term.
    pub docs_count: u64,

    /// Total number of occurrences of the term across the field.
    pub total_freq: u64,
}

impl Attribute for TermMeta {
    fn clear(&mut self) {
        self.docs_count = 0;
        self.total_freq = 0;
    }
}

/// Outcome of seeking a term iterator to an exact byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSeekResult {
    /// The target term exists; the iterator is positioned on it.
    Found,
    /// The target is absent; the iterator is positioned on the first term
    /// greater than it.
    NotFoundGreater,
    /// The target is absent and every term is less than it; the iterator is
    /// exhausted.
    NotFoundLess,
}

/// Walks the terms of one field in lexicographic order.
pub trait TermIterator {
    /// Advance to the next term.
    fn next(&mut self) -> bool;

    /// Bytes of the current term. Nil before the first advance and after
    /// exhaustion.
    fn value(&self) -> BytesRef<'_>;

    /// Attributes of the current term ([`TermMeta`] at minimum).
    fn attributes(&self) -> AttributeView<'_>;

    /// Open a postings iterator over the current term.
    ///
    /// `features` selects which attributes the postings expose and must be
    /// a subset of the field's indexed features.
    fn postings(&self, features: IndexFeatures) -> Result<Box<dyn DocIterator>>;
}

/// A term iterator that can additionally jump to an arbitrary term.
pub trait SeekTermIterator: TermIterator {
    /// Position on the first term `>= target`.
    fn seek(&mut self, target: BytesRef<'_>) -> TermSeekResult;
}

/// Per-field entry point to ordered terms and their postings.
pub trait TermReader {
    /// Metadata of the field this reader serves.
    fn meta(&self) -> &FieldInfo;

    /// A fresh iterator positioned before the first term.
    fn iterator(&self) -> Box<dyn SeekTermIterator + '_>;

    /// Number of distinct terms in the field.
    fn size(&self) -> u64;

    /// Number of documents with at least one token in the field.
    fn docs_count(&self) -> u64;

    /// The lexicographically smallest term.
    fn min(&self) -> BytesRef<'_>;

    /// The lexicographically greatest term.
    fn max(&self) -> BytesRef<'_>;

    /// Aggregate field statistics.
    fn stats(&self) -> FieldStats;

    /// The field's indexed features.
    fn features(&self) -> IndexFeatures {
        self.meta().features
    }
}
