//! In-memory segment and index.
//!
//! The reference store behind the reader contracts: a segment writer
//! consumes token streams through the analysis attribute contract and
//! freezes into an immutable [`MemorySegment`]; [`MemoryIndex`] stacks
//! segments into a snapshot. Postings keep positions, offsets and payloads
//! per the field's feature set, norms land in a per-field column.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;

use crate::analysis::TokenStream;
use crate::attribute::kinds::{
    Cost, Document, Frequency, Increment, Offset, Payload, Position, TermAttr,
};
use crate::attribute::{AttrRef, AttributeStore, AttributeView};
use crate::doc_id::{self, DocId};
use crate::error::{Result, SagittaError};
use crate::index::field::{ColumnId, FieldId, FieldInfo, FieldStats, IndexFeatures};
use crate::index::reader::{ColumnReader, DocMask, IndexReader, SegmentReader, ValuesReader};
use crate::index::term::{SeekTermIterator, TermIterator, TermMeta, TermReader, TermSeekResult};
use crate::iterator::{DocIterator, EmptyDocIterator, PositionIterator};
use crate::util::bytes::BytesRef;

/// One indexed occurrence of a term at a position.
#[derive(Debug, Clone)]
struct PositionRecord {
    pos: u32,
    start: u32,
    end: u32,
    payload: Vec<u8>,
}

/// One document's entry in a posting list.
#[derive(Debug, Clone)]
struct Posting {
    doc: DocId,
    freq: u64,
    positions: Vec<PositionRecord>,
}

/// The postings of one term, frozen.
#[derive(Debug)]
struct TermEntry {
    postings: Vec<Posting>,
    total_freq: u64,
}

/// A frozen field: ordered term dictionary plus statistics.
#[derive(Debug)]
pub struct MemoryField {
    info: FieldInfo,
    terms: BTreeMap<Vec<u8>, Arc<TermEntry>>,
    stats: FieldStats,
    mask: Arc<DocMask>,
}

/// A frozen column: per-document byte values.
#[derive(Debug, Default)]
pub struct MemoryColumn {
    values: AHashMap<DocId, Vec<u8>>,
}

impl ColumnReader for MemoryColumn {
    fn value(&self, doc: DocId) -> Option<&[u8]> {
        self.values.get(&doc).map(Vec::as_slice)
    }
}

/// An immutable in-memory segment.
#[derive(Debug)]
pub struct MemorySegment {
    fields: Vec<MemoryField>,
    fields_by_name: AHashMap<String, usize>,
    columns: Vec<Arc<MemoryColumn>>,
    columns_by_name: AHashMap<String, ColumnId>,
    doc_mask: Arc<DocMask>,
    docs_count: u64,
}

impl SegmentReader for MemorySegment {
    fn docs_count(&self) -> u64 {
        self.docs_count
    }

    fn doc_mask(&self) -> Option<&DocMask> {
        (!self.doc_mask.is_empty()).then_some(&*self.doc_mask)
    }

    fn field(&self, name: &str) -> Option<&dyn TermReader> {
        self.fields_by_name
            .get(name)
            .map(|&i| &self.fields[i] as &dyn TermReader)
    }

    fn field_by_id(&self, id: FieldId) -> Option<&dyn TermReader> {
        self.fields
            .get(id as usize)
            .map(|field| field as &dyn TermReader)
    }

    fn column(&self, id: ColumnId) -> Option<&dyn ColumnReader> {
        self.columns
            .get(id as usize)
            .map(|col| col.as_ref() as &dyn ColumnReader)
    }

    fn column_named(&self, name: &str) -> Option<&dyn ColumnReader> {
        self.columns_by_name.get(name).and_then(|&id| self.column(id))
    }

    fn values(&self, id: ColumnId) -> Option<ValuesReader> {
        let column = self.columns.get(id as usize)?.clone();
        Some(Rc::new(move |doc| column.values.get(&doc).cloned()))
    }
}

/// An ordered list of segments published as one snapshot.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    segments: Vec<MemorySegment>,
}

impl MemoryIndex {
    /// An empty index.
    pub fn new() -> Self {
        MemoryIndex::default()
    }

    /// Append a segment to the snapshot.
    pub fn add_segment(&mut self, segment: MemorySegment) {
        self.segments.push(segment);
    }
}

impl IndexReader for MemoryIndex {
    fn segments_count(&self) -> usize {
        self.segments.len()
    }

    fn segment(&self, i: usize) -> &dyn SegmentReader {
        &self.segments[i]
    }

    fn docs_count(&self) -> u64 {
        self.segments.iter().map(MemorySegment::docs_count).sum()
    }

    fn live_docs_count(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| SegmentReader::live_docs_count(segment))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Term reader
// ---------------------------------------------------------------------------

impl TermReader for MemoryField {
    fn meta(&self) -> &FieldInfo {
        &self.info
    }

    fn iterator(&self) -> Box<dyn SeekTermIterator + '_> {
        Box::new(MemoryTermIterator::new(self))
    }

    fn size(&self) -> u64 {
        self.terms.len() as u64
    }

    fn docs_count(&self) -> u64 {
        self.stats.docs_count
    }

    fn min(&self) -> BytesRef<'_> {
        self.terms
            .first_key_value()
            .map_or(BytesRef::nil(), |(key, _)| BytesRef::from(key))
    }

    fn max(&self) -> BytesRef<'_> {
        self.terms
            .last_key_value()
            .map_or(BytesRef::nil(), |(key, _)| BytesRef::from(key))
    }

    fn stats(&self) -> FieldStats {
        self.stats
    }
}

/// Walks a frozen field's term dictionary in order.
struct MemoryTermIterator<'a> {
    field: &'a MemoryField,
    range: std::collections::btree_map::Range<'a, Vec<u8>, Arc<TermEntry>>,
    current: Option<(&'a Vec<u8>, &'a Arc<TermEntry>)>,
    attrs: AttributeStore,
    meta: AttrRef<TermMeta>,
}

impl<'a> MemoryTermIterator<'a> {
    fn new(field: &'a MemoryField) -> Self {
        let mut attrs = AttributeStore::new();
        let meta = attrs.emplace(TermMeta::default());
        MemoryTermIterator {
            field,
            range: field.terms.range::<Vec<u8>, _>(..),
            current: None,
            attrs,
            meta,
        }
    }

    fn settle(&mut self, entry: Option<(&'a Vec<u8>, &'a Arc<TermEntry>)>) {
        self.current = entry;
        let mut meta = self.meta.borrow_mut();
        match entry {
            Some((_, term)) => {
                meta.docs_count = term.postings.len() as u64;
                meta.total_freq = term.total_freq;
            }
            None => {
                meta.docs_count = 0;
                meta.total_freq = 0;
            }
        }
    }
}

impl TermIterator for MemoryTermIterator<'_> {
    fn next(&mut self) -> bool {
        let entry = self.range.next();
        self.settle(entry);
        self.current.is_some()
    }

    fn value(&self) -> BytesRef<'_> {
        self.current
            .map_or(BytesRef::nil(), |(key, _)| BytesRef::from(key))
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }

    fn postings(&self, features: IndexFeatures) -> Result<Box<dyn DocIterator>> {
        if !self.field.info.features.contains(features) {
            return Err(SagittaError::invalid_argument(format!(
                "requested features not indexed for field '{}'",
                self.field.info.name
            )));
        }
        match self.current {
            Some((_, entry)) => Ok(Box::new(MemoryPostingsIterator::new(
                entry.clone(),
                self.field.mask.clone(),
                features,
            ))),
            None => Ok(Box::new(EmptyDocIterator::with_cost())),
        }
    }
}

impl SeekTermIterator for MemoryTermIterator<'_> {
    fn seek(&mut self, target: BytesRef<'_>) -> TermSeekResult {
        self.range = self
            .field
            .terms
            .range::<[u8], _>((Bound::Included(target.as_bytes()), Bound::Unbounded));
        let entry = self.range.next();
        self.settle(entry);
        match self.current {
            Some((key, _)) if key.as_slice() == target.as_bytes() => TermSeekResult::Found,
            Some(_) => TermSeekResult::NotFoundGreater,
            None => TermSeekResult::NotFoundLess,
        }
    }
}

// ---------------------------------------------------------------------------
// Postings
// ---------------------------------------------------------------------------

/// Iterates one term's postings, skipping masked documents.
struct MemoryPostingsIterator {
    entry: Arc<TermEntry>,
    mask: Arc<DocMask>,
    /// Index of the next posting to consume.
    next_idx: usize,
    value: DocId,
    attrs: AttributeStore,
    doc: AttrRef<Document>,
    freq: Option<AttrRef<Frequency>>,
    pos: Option<AttrRef<Position>>,
    features: IndexFeatures,
}

impl MemoryPostingsIterator {
    fn new(entry: Arc<TermEntry>, mask: Arc<DocMask>, features: IndexFeatures) -> Self {
        let mut attrs = AttributeStore::new();
        attrs.emplace(Cost {
            estimate: entry.postings.len() as u64,
        });
        let doc = attrs.emplace(Document::default());
        let freq = features
            .contains(IndexFeatures::FREQ)
            .then(|| attrs.emplace(Frequency::default()));
        let pos = features
            .contains(IndexFeatures::POSITION)
            .then(|| attrs.emplace(Position::default()));

        MemoryPostingsIterator {
            entry,
            mask,
            next_idx: 0,
            value: doc_id::INVALID,
            attrs,
            doc,
            freq,
            pos,
            features,
        }
    }

    /// Position on the first unmasked posting at or after index `i`.
    fn settle_at(&mut self, mut i: usize) -> DocId {
        let postings = &self.entry.postings;
        while i < postings.len() && self.mask.contains(postings[i].doc) {
            i += 1;
        }
        if i >= postings.len() {
            self.next_idx = postings.len();
            self.value = doc_id::EOF;
            self.doc.borrow_mut().value = doc_id::EOF;
            return self.value;
        }

        let posting = &postings[i];
        self.next_idx = i + 1;
        self.value = posting.doc;
        self.doc.borrow_mut().value = posting.doc;
        if let Some(freq) = &self.freq {
            freq.borrow_mut().value = posting.freq;
        }
        if let Some(pos) = &self.pos {
            pos.borrow_mut().reset(Box::new(MemoryPositionIterator::new(
                self.entry.clone(),
                i,
                self.features,
            )));
        }
        self.value
    }
}

impl DocIterator for MemoryPostingsIterator {
    fn value(&self) -> DocId {
        self.value
    }

    fn next(&mut self) -> bool {
        if doc_id::is_eof(self.value) {
            return false;
        }
        !doc_id::is_eof(self.settle_at(self.next_idx))
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_id::is_eof(self.value) {
            return self.value;
        }
        if doc_id::valid(self.value) && target <= self.value {
            return self.value;
        }
        let postings = &self.entry.postings;
        let from = postings.partition_point(|posting| posting.doc < target);
        self.settle_at(from)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

/// Iterates the positions of one posting.
struct MemoryPositionIterator {
    entry: Arc<TermEntry>,
    posting: usize,
    next_idx: usize,
    value: u32,
    attrs: AttributeStore,
    offset: Option<AttrRef<Offset>>,
    payload: Option<AttrRef<Payload>>,
}

impl MemoryPositionIterator {
    fn new(entry: Arc<TermEntry>, posting: usize, features: IndexFeatures) -> Self {
        let mut attrs = AttributeStore::new();
        let offset = features
            .contains(IndexFeatures::OFFSET)
            .then(|| attrs.emplace(Offset::default()));
        let payload = features
            .contains(IndexFeatures::PAYLOAD)
            .then(|| attrs.emplace(Payload::default()));
        MemoryPositionIterator {
            entry,
            posting,
            next_idx: 0,
            value: Position::INVALID,
            attrs,
            offset,
            payload,
        }
    }
}

impl PositionIterator for MemoryPositionIterator {
    fn value(&self) -> u32 {
        self.value
    }

    fn next(&mut self) -> bool {
        let records = &self.entry.postings[self.posting].positions;
        if self.next_idx >= records.len() {
            self.value = Position::NO_MORE;
            return false;
        }
        let record = &records[self.next_idx];
        self.next_idx += 1;
        self.value = record.pos;
        if let Some(offset) = &self.offset {
            *offset.borrow_mut() = Offset {
                start: record.start,
                end: record.end,
            };
        }
        if let Some(payload) = &self.payload {
            payload.borrow_mut().value = record.payload.clone();
        }
        true
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct FieldBuilder {
    info: FieldInfo,
    terms: BTreeMap<Vec<u8>, TermBuilder>,
    stats: FieldStats,
}

#[derive(Default)]
struct TermBuilder {
    postings: Vec<Posting>,
    total_freq: u64,
}

#[derive(Default)]
struct ColumnBuilder {
    values: AHashMap<DocId, Vec<u8>>,
}

/// Builds an immutable segment from documents of fielded token streams.
pub struct MemorySegmentWriter {
    fields: Vec<FieldBuilder>,
    fields_by_name: AHashMap<String, usize>,
    columns: Vec<ColumnBuilder>,
    columns_by_name: AHashMap<String, ColumnId>,
    doc_mask: DocMask,
    next_doc: DocId,
}

impl Default for MemorySegmentWriter {
    fn default() -> Self {
        MemorySegmentWriter::new()
    }
}

impl MemorySegmentWriter {
    /// A writer with no documents.
    pub fn new() -> Self {
        MemorySegmentWriter {
            fields: Vec::new(),
            fields_by_name: AHashMap::new(),
            columns: Vec::new(),
            columns_by_name: AHashMap::new(),
            doc_mask: DocMask::new(),
            next_doc: doc_id::MIN,
        }
    }

    /// Start a new document. The returned writer must be committed for the
    /// document's content to become visible; the id is allocated either
    /// way.
    pub fn insert(&mut self) -> DocumentWriter<'_> {
        let doc = self.next_doc;
        self.next_doc += 1;
        DocumentWriter {
            writer: self,
            doc,
            fields: AHashMap::new(),
            stored: Vec::new(),
        }
    }

    /// Logically delete a document.
    pub fn mask(&mut self, doc: DocId) {
        self.doc_mask.insert(doc);
    }

    /// Number of documents allocated so far.
    pub fn docs_count(&self) -> u64 {
        (self.next_doc - doc_id::MIN) as u64
    }

    /// Freeze into an immutable segment.
    pub fn build(self) -> MemorySegment {
        let doc_mask = Arc::new(self.doc_mask);
        let fields = self
            .fields
            .into_iter()
            .map(|builder| MemoryField {
                info: builder.info,
                terms: builder
                    .terms
                    .into_iter()
                    .map(|(term, entry)| {
                        (
                            term,
                            Arc::new(TermEntry {
                                postings: entry.postings,
                                total_freq: entry.total_freq,
                            }),
                        )
                    })
                    .collect(),
                stats: builder.stats,
                mask: doc_mask.clone(),
            })
            .collect();
        MemorySegment {
            fields,
            fields_by_name: self.fields_by_name,
            columns: self
                .columns
                .into_iter()
                .map(|builder| Arc::new(MemoryColumn {
                    values: builder.values,
                }))
                .collect(),
            columns_by_name: self.columns_by_name,
            doc_mask,
            docs_count: (self.next_doc - doc_id::MIN) as u64,
        }
    }

    fn field_index(&mut self, name: &str, features: IndexFeatures) -> Result<usize> {
        if let Some(&i) = self.fields_by_name.get(name) {
            if self.fields[i].info.features != features {
                return Err(SagittaError::invalid_argument(format!(
                    "field '{name}' was indexed with different features"
                )));
            }
            return Ok(i);
        }

        let id = self.fields.len() as u32;
        let norm_column = features.contains(IndexFeatures::NORM).then(|| {
            let column = self.columns.len() as ColumnId;
            self.columns.push(ColumnBuilder::default());
            column
        });
        self.fields.push(FieldBuilder {
            info: FieldInfo {
                name: name.to_string(),
                id,
                features,
                norm_column,
            },
            terms: BTreeMap::new(),
            stats: FieldStats::default(),
        });
        self.fields_by_name.insert(name.to_string(), self.fields.len() - 1);
        Ok(self.fields.len() - 1)
    }

    fn named_column(&mut self, name: &str) -> ColumnId {
        if let Some(&id) = self.columns_by_name.get(name) {
            return id;
        }
        let id = self.columns.len() as ColumnId;
        self.columns.push(ColumnBuilder::default());
        self.columns_by_name.insert(name.to_string(), id);
        id
    }
}

struct FieldAccum {
    field: usize,
    last_pos: Option<u32>,
    token_count: u64,
    terms: AHashMap<Vec<u8>, Vec<PositionRecord>>,
}

/// Accumulates one document's fields, then commits them atomically.
pub struct DocumentWriter<'a> {
    writer: &'a mut MemorySegmentWriter,
    doc: DocId,
    fields: AHashMap<String, FieldAccum>,
    stored: Vec<(String, Vec<u8>)>,
}

impl DocumentWriter<'_> {
    /// The id allocated for this document.
    pub fn doc(&self) -> DocId {
        self.doc
    }

    /// Consume a token stream into the named field.
    ///
    /// Reads the stream's [`TermAttr`] (required), [`Increment`], [`Offset`]
    /// and [`Payload`] attributes after every advance. Indexing the same
    /// field twice continues the position counter.
    pub fn index_field(
        &mut self,
        name: &str,
        features: IndexFeatures,
        stream: &mut dyn TokenStream,
    ) -> Result<()> {
        let field = self.writer.field_index(name, features)?;
        let attrs = stream.attributes();
        let term = attrs.get::<TermAttr>().ok_or_else(|| {
            SagittaError::invalid_argument("token stream exposes no term attribute")
        })?;
        let increment = attrs.get::<Increment>();
        let offset = attrs.get::<Offset>();
        let payload = attrs.get::<Payload>();

        let accum = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| FieldAccum {
                field,
                last_pos: None,
                token_count: 0,
                terms: AHashMap::new(),
            });

        while stream.next() {
            let inc = increment.as_ref().map_or(1, |cell| cell.borrow().value);
            // A leading zero increment lands on position 0.
            let pos = match accum.last_pos {
                None => inc.saturating_sub(1),
                Some(prev) => prev + inc,
            };
            accum.last_pos = Some(pos);
            accum.token_count += 1;

            let (start, end) = offset
                .as_ref()
                .map_or((0, 0), |cell| {
                    let o = cell.borrow();
                    (o.start, o.end)
                });
            let record = PositionRecord {
                pos,
                start,
                end,
                payload: payload
                    .as_ref()
                    .map_or_else(Vec::new, |cell| cell.borrow().value.clone()),
            };
            accum
                .terms
                .entry(term.borrow().bytes().to_vec())
                .or_default()
                .push(record);
        }
        Ok(())
    }

    /// Store a value for this document in the named column.
    pub fn store(&mut self, column: &str, value: &[u8]) {
        self.stored.push((column.to_string(), value.to_vec()));
    }

    /// Flush the accumulated fields and columns into the segment.
    pub fn commit(self) -> DocId {
        let DocumentWriter {
            writer,
            doc,
            fields,
            stored,
        } = self;

        for (_, accum) in fields {
            let builder = &mut writer.fields[accum.field];
            builder.stats.docs_count += 1;
            builder.stats.total_term_freq += accum.token_count;

            for (term, mut positions) in accum.terms {
                positions.sort_by_key(|record| record.pos);
                let freq = positions.len() as u64;
                let entry = builder.terms.entry(term).or_default();
                entry.postings.push(Posting {
                    doc,
                    freq,
                    positions,
                });
                entry.total_freq += freq;
            }

            if let Some(column) = builder.info.norm_column {
                let norm = 1.0 / (accum.token_count.max(1) as f32).sqrt();
                writer.columns[column as usize]
                    .values
                    .insert(doc, norm.to_le_bytes().to_vec());
            }
        }

        for (column, value) in stored {
            let id = writer.named_column(&column);
            writer.columns[id as usize].values.insert(doc, value);
        }
        doc
    }
}
