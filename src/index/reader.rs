//! Index and segment reader contracts.

use std::rc::Rc;

use ahash::AHashSet;

use crate::doc_id::DocId;
use crate::error::{Result, SagittaError};
use crate::index::field::{ColumnId, FieldId};
use crate::index::term::TermReader;

/// The set of logically deleted documents within a segment.
#[derive(Debug, Clone, Default)]
pub struct DocMask {
    deleted: AHashSet<DocId>,
}

impl DocMask {
    /// An empty mask.
    pub fn new() -> Self {
        DocMask::default()
    }

    /// Mark `doc` as deleted.
    pub fn insert(&mut self, doc: DocId) {
        self.deleted.insert(doc);
    }

    /// Whether `doc` is deleted.
    pub fn contains(&self, doc: DocId) -> bool {
        self.deleted.contains(&doc)
    }

    /// Number of deleted documents.
    pub fn len(&self) -> usize {
        self.deleted.len()
    }

    /// Whether no document is deleted.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }
}

/// Random access to a column's per-document values.
pub trait ColumnReader {
    /// The value stored for `doc`, if any.
    fn value(&self, doc: DocId) -> Option<&[u8]>;
}

/// Owning per-document value accessor, detached from the segment borrow.
///
/// This is the columnstore contract norms resolve through: implementations
/// capture whatever shared state they need so the closure can outlive the
/// segment reference that produced it.
pub type ValuesReader = Rc<dyn Fn(DocId) -> Option<Vec<u8>>>;

/// Read access to one immutable segment.
///
/// Document ids are segment-local, starting at [`crate::doc_id::MIN`].
pub trait SegmentReader {
    /// Total number of documents allocated in this segment.
    fn docs_count(&self) -> u64;

    /// Deleted documents, if any.
    fn doc_mask(&self) -> Option<&DocMask>;

    /// Number of documents not masked as deleted.
    fn live_docs_count(&self) -> u64 {
        self.docs_count() - self.doc_mask().map_or(0, |mask| mask.len() as u64)
    }

    /// The term reader of the named field.
    fn field(&self, name: &str) -> Option<&dyn TermReader>;

    /// The term reader of the field with the given id.
    fn field_by_id(&self, id: FieldId) -> Option<&dyn TermReader>;

    /// The column with the given id.
    fn column(&self, id: ColumnId) -> Option<&dyn ColumnReader>;

    /// The named column.
    fn column_named(&self, name: &str) -> Option<&dyn ColumnReader>;

    /// An owning value accessor for the column, per the columnstore
    /// contract.
    fn values(&self, id: ColumnId) -> Option<ValuesReader>;
}

impl dyn SegmentReader + '_ {
    /// Like [`SegmentReader::field`], failing with `MissingField` for hosts
    /// that treat absence as an error.
    pub fn field_checked(&self, name: &str) -> Result<&dyn TermReader> {
        self.field(name)
            .ok_or_else(|| SagittaError::missing_field(name))
    }

    /// Like [`SegmentReader::column_named`], failing with `MissingColumn`.
    pub fn column_named_checked(&self, name: &str) -> Result<&dyn ColumnReader> {
        self.column_named(name)
            .ok_or_else(|| SagittaError::missing_column(name))
    }
}

/// A published snapshot of an index: an ordered list of segments.
///
/// Snapshots are immutable and safe for concurrent read.
pub trait IndexReader {
    /// Number of segments in the snapshot.
    fn segments_count(&self) -> usize;

    /// The `i`-th segment.
    fn segment(&self, i: usize) -> &dyn SegmentReader;

    /// Total number of documents across segments.
    fn docs_count(&self) -> u64;

    /// Total number of live documents across segments.
    fn live_docs_count(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_mask() {
        let mut mask = DocMask::new();
        assert!(mask.is_empty());
        mask.insert(3);
        mask.insert(3);
        mask.insert(9);
        assert_eq!(mask.len(), 2);
        assert!(mask.contains(3));
        assert!(!mask.contains(4));
    }
}
