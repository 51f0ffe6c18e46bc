//! The core attribute kinds.
//!
//! Analysis-side kinds ([`TermAttr`], [`Increment`], [`Offset`],
//! [`Payload`]) are produced by token streams and consumed by the writer;
//! search-side kinds ([`Document`], [`Frequency`], [`Position`], [`Norm`],
//! [`Cost`]) are published by document iterators and consumed by scorers and
//! combinators.

use std::rc::Rc;

use crate::attribute::{AttrRef, Attribute, AttributeView};
use crate::doc_id::{self, DocId};
use crate::iterator::PositionIterator;

/// Byte offsets of the current token within the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Offset {
    pub start: u32,
    pub end: u32,
}

impl Offset {
    /// Marker for an unknown offset.
    pub const INVALID_OFFSET: u32 = u32::MAX;
}

impl Attribute for Offset {
    fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

/// Position delta between the current token and its predecessor.
///
/// The default of 1 places consecutive tokens at consecutive positions; 0
/// stacks the current token onto the previous position (synonyms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    pub value: u32,
}

impl Default for Increment {
    fn default() -> Self {
        Increment { value: 1 }
    }
}

impl Attribute for Increment {
    fn clear(&mut self) {
        self.value = 1;
    }
}

/// Bytes of the current token.
///
/// The buffer is overwritten on every stream advance; readers must not hold
/// on to it across calls.
#[derive(Debug, Clone, Default)]
pub struct TermAttr {
    value: Vec<u8>,
}

impl TermAttr {
    /// Replace the current token bytes.
    pub fn set(&mut self, bytes: &[u8]) {
        self.value.clear();
        self.value.extend_from_slice(bytes);
    }

    /// The current token bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.value
    }
}

impl Attribute for TermAttr {
    fn clear(&mut self) {
        self.value.clear();
    }
}

/// Arbitrary per-position bytes. Empty means "no payload".
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub value: Vec<u8>,
}

impl Attribute for Payload {
    fn clear(&mut self) {
        self.value.clear();
    }
}

/// The current document id of an iterator.
#[derive(Debug, Clone, Copy)]
pub struct Document {
    pub value: DocId,
}

impl Default for Document {
    fn default() -> Self {
        Document {
            value: doc_id::INVALID,
        }
    }
}

impl Attribute for Document {
    fn clear(&mut self) {
        self.value = doc_id::INVALID;
    }
}

/// Occurrence count of a term within the current document.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frequency {
    pub value: u64,
}

impl Attribute for Frequency {
    fn clear(&mut self) {
        self.value = 0;
    }
}

/// Resolves norm values for the current document from a column.
pub type NormReader = Rc<dyn Fn(DocId) -> Option<f32>>;

/// Field-length normalization factor.
///
/// Resolved lazily against a per-field column keyed by the iterator's
/// current document; unresolved norms read as [`Norm::DEFAULT`].
#[derive(Default)]
pub struct Norm {
    column: Option<NormReader>,
    doc: Option<AttrRef<Document>>,
}

impl Norm {
    /// The norm of a document without a stored value.
    pub const DEFAULT: f32 = 1.0;

    /// Bind this norm to a column and the document attribute tracking the
    /// owning iterator.
    pub fn reset(&mut self, column: NormReader, doc: AttrRef<Document>) {
        self.column = Some(column);
        self.doc = Some(doc);
    }

    /// The norm of the current document.
    pub fn read(&self) -> f32 {
        if let (Some(column), Some(doc)) = (&self.column, &self.doc) {
            let id = doc.borrow().value;
            if doc_id::valid(id) && !doc_id::is_eof(id) {
                return column(id).unwrap_or(Self::DEFAULT);
            }
        }
        Self::DEFAULT
    }

    /// Whether the norm is unbound.
    pub fn is_empty(&self) -> bool {
        self.column.is_none()
    }
}

impl Attribute for Norm {
    fn clear(&mut self) {
        self.column = None;
        self.doc = None;
    }
}

impl std::fmt::Debug for Norm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Norm")
            .field("bound", &self.column.is_some())
            .finish()
    }
}

/// Upper bound on the number of matches an iterator may still produce.
///
/// Combinators use it to schedule the cheapest input first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cost {
    pub estimate: u64,
}

impl Cost {
    /// Read the cost published by an iterator, or `default` if it exposes
    /// none.
    pub fn extract(attrs: AttributeView<'_>, default: u64) -> u64 {
        attrs
            .get::<Cost>()
            .map_or(default, |cost| cost.borrow().estimate)
    }
}

impl Attribute for Cost {
    fn clear(&mut self) {
        self.estimate = 0;
    }
}

/// Marker: indexed tokens are prefixed with one precision byte.
///
/// Exact values carry prefix 0; the coarser the token, the greater its
/// prefix byte. Carries no value of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct GranularityPrefix;

impl Attribute for GranularityPrefix {
    fn clear(&mut self) {}
}

/// Slot for the per-document position sub-iterator.
///
/// Postings iterators opened with position support install a fresh
/// sub-iterator here on every document advance.
#[derive(Default)]
pub struct Position {
    iter: Option<Box<dyn PositionIterator>>,
}

impl Position {
    /// Pre-first sentinel; never produced as a position.
    pub const INVALID: u32 = u32::MAX;
    /// Terminal position value.
    pub const NO_MORE: u32 = Self::INVALID - 1;

    /// Install the position stream for the current document.
    pub fn reset(&mut self, iter: Box<dyn PositionIterator>) {
        self.iter = Some(iter);
    }

    /// The installed sub-iterator, if any.
    pub fn get(&self) -> Option<&dyn PositionIterator> {
        self.iter.as_deref()
    }

    /// Mutable access to the installed sub-iterator.
    pub fn get_mut(&mut self) -> Option<&mut (dyn PositionIterator + 'static)> {
        self.iter.as_deref_mut()
    }

    /// Current position, [`Position::INVALID`] before the first advance.
    pub fn value(&self) -> u32 {
        self.iter.as_deref().map_or(Self::INVALID, |it| it.value())
    }

    /// Advance to the next position.
    pub fn next(&mut self) -> bool {
        self.iter.as_deref_mut().is_some_and(|it| it.next())
    }

    /// Skip forward to the first position not less than `target` under the
    /// skewed ordering; see [`PositionIterator::seek`].
    pub fn seek(&mut self, target: u32) -> u32 {
        self.iter
            .as_deref_mut()
            .map_or(Self::NO_MORE, |it| it.seek(target))
    }
}

impl Attribute for Position {
    fn clear(&mut self) {
        self.iter = None;
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Position")
            .field("value", &self.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeStore;

    #[test]
    fn test_offset_clear() {
        let mut offs = Offset { start: 3, end: 9 };
        offs.clear();
        assert_eq!(offs, Offset { start: 0, end: 0 });
        assert_eq!(Offset::INVALID_OFFSET, u32::MAX);
    }

    #[test]
    fn test_increment_defaults_to_one() {
        let mut inc = Increment::default();
        assert_eq!(inc.value, 1);
        inc.value = 0;
        inc.clear();
        assert_eq!(inc.value, 1);
    }

    #[test]
    fn test_term_attr_overwrites() {
        let mut term = TermAttr::default();
        term.set(b"alpha");
        assert_eq!(term.bytes(), b"alpha");
        term.set(b"be");
        assert_eq!(term.bytes(), b"be");
        term.clear();
        assert!(term.bytes().is_empty());
    }

    #[test]
    fn test_document_defaults_invalid() {
        let doc = Document::default();
        assert!(!crate::doc_id::valid(doc.value));
    }

    #[test]
    fn test_norm_unbound_reads_default() {
        let norm = Norm::default();
        assert!(norm.is_empty());
        assert_eq!(norm.read(), Norm::DEFAULT);
    }

    #[test]
    fn test_norm_reads_through_column() {
        let mut store = AttributeStore::new();
        let doc = store.add::<Document>().unwrap();
        let mut norm = Norm::default();
        norm.reset(Rc::new(|id| (id == 2).then_some(0.5)), doc.clone());

        // Pre-first document: default.
        assert_eq!(norm.read(), Norm::DEFAULT);

        doc.borrow_mut().value = 2;
        assert_eq!(norm.read(), 0.5);

        // Document without a stored norm: default.
        doc.borrow_mut().value = 3;
        assert_eq!(norm.read(), Norm::DEFAULT);
    }

    #[test]
    fn test_cost_extract() {
        let mut store = AttributeStore::new();
        assert_eq!(Cost::extract(store.view(), 99), 99);
        store.emplace(Cost { estimate: 7 });
        assert_eq!(Cost::extract(store.view(), 99), 7);
    }

    #[test]
    fn test_position_reserved_values() {
        assert_eq!(Position::INVALID, u32::MAX);
        assert_eq!(Position::NO_MORE, u32::MAX - 1);

        let mut pos = Position::default();
        assert_eq!(pos.value(), Position::INVALID);
        assert!(!pos.next());
        assert_eq!(pos.seek(0), Position::NO_MORE);
    }
}
