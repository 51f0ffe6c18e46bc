//! Bitset-backed document iterator.

use std::borrow::Cow;

use crate::attribute::kinds::{Cost, Document};
use crate::attribute::{AttrRef, AttributeStore, AttributeView};
use crate::doc_id::{self, DocId};
use crate::iterator::DocIterator;
use crate::util::bitset::{BitSet, WORD_BITS};

/// Iterates the documents of a bitset in ascending order.
///
/// Bit `i` maps to document id `MIN + i`. The iterator publishes a [`Cost`]
/// equal to the population count and skips zero words during both `next`
/// and `seek`.
pub struct BitsetDocIterator<'a> {
    bits: Cow<'a, BitSet>,
    value: DocId,
    attrs: AttributeStore,
    doc: AttrRef<Document>,
}

impl<'a> BitsetDocIterator<'a> {
    /// Iterate a caller-owned bitset.
    pub fn new(bits: &'a BitSet) -> Self {
        Self::build(Cow::Borrowed(bits))
    }

    /// Take ownership of the bitset and iterate it.
    pub fn from_owned(bits: BitSet) -> BitsetDocIterator<'static> {
        BitsetDocIterator::build(Cow::Owned(bits))
    }

    fn build(bits: Cow<'a, BitSet>) -> BitsetDocIterator<'a> {
        let count = bits.count() as u64;
        let mut attrs = AttributeStore::new();
        attrs.emplace(Cost { estimate: count });
        let doc = attrs.emplace(Document::default());

        // A bitset with nothing set can never produce a document.
        let value = if count == 0 {
            doc_id::EOF
        } else {
            doc_id::INVALID
        };
        doc.borrow_mut().value = value;

        BitsetDocIterator {
            bits,
            value,
            attrs,
            doc,
        }
    }

    fn settle(&mut self, id: DocId) -> DocId {
        self.value = id;
        self.doc.borrow_mut().value = id;
        id
    }

    // Lowest set bit at or above `from`, if any.
    fn find_from(&self, from: usize) -> Option<usize> {
        let words = self.bits.words();
        let mut w = from / WORD_BITS;
        if w >= words.len() {
            return None;
        }
        let mut word = words[w] & (!0u64 << (from % WORD_BITS));
        loop {
            if word != 0 {
                return Some(w * WORD_BITS + word.trailing_zeros() as usize);
            }
            w += 1;
            if w >= words.len() {
                return None;
            }
            word = words[w];
        }
    }
}

impl DocIterator for BitsetDocIterator<'_> {
    fn value(&self) -> DocId {
        self.value
    }

    fn next(&mut self) -> bool {
        if doc_id::is_eof(self.value) {
            return false;
        }
        let from = if doc_id::valid(self.value) {
            (self.value - doc_id::MIN) as usize + 1
        } else {
            0
        };
        match self.find_from(from) {
            Some(bit) => {
                self.settle(doc_id::MIN + bit as DocId);
                true
            }
            None => {
                self.settle(doc_id::EOF);
                false
            }
        }
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_id::is_eof(self.value) {
            return self.value;
        }
        // Never move backward; a pre-first seek to INVALID lands on the
        // first set bit.
        if doc_id::valid(self.value) && target <= self.value {
            return self.value;
        }
        if doc_id::is_eof(target) {
            return self.settle(doc_id::EOF);
        }
        let from = if doc_id::valid(target) {
            (target - doc_id::MIN) as usize
        } else {
            0
        };
        match self.find_from(from) {
            Some(bit) => self.settle(doc_id::MIN + bit as DocId),
            None => self.settle(doc_id::EOF),
        }
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_set(capacity: usize) -> BitSet {
        let mut bs = BitSet::new(capacity);
        bs.memset(&vec![!0u64; capacity.div_ceil(WORD_BITS)]);
        bs
    }

    #[test]
    fn test_empty_bitset_is_eof_immediately() {
        let bs = BitSet::new(0);
        let mut it = BitsetDocIterator::new(&bs);
        assert!(doc_id::is_eof(it.value()));
        assert_eq!(Cost::extract(it.attributes(), u64::MAX), 0);
        assert!(!it.next());
        assert!(!it.next());
    }

    #[test]
    fn test_no_bits_set_is_eof_immediately() {
        let bs = BitSet::new(13);
        let mut it = BitsetDocIterator::new(&bs);
        assert!(doc_id::is_eof(it.value()));
        assert_eq!(Cost::extract(it.attributes(), u64::MAX), 0);
        assert_eq!(it.seek(1), doc_id::EOF);
    }

    #[test]
    fn test_next_dense() {
        let bs = all_set(73);
        let mut it = BitsetDocIterator::new(&bs);
        assert!(!doc_id::valid(it.value()));
        assert_eq!(Cost::extract(it.attributes(), 0), 73);

        for i in 0..73u32 {
            assert!(it.next());
            assert_eq!(it.value(), doc_id::MIN + i);
        }
        assert!(!it.next());
        assert!(doc_id::is_eof(it.value()));
    }

    #[test]
    fn test_word_skip_over_zero_words() {
        // Bits only in the first and fourth words.
        let mut bs = BitSet::new(256);
        bs.set(3);
        bs.set(200);
        let mut it = BitsetDocIterator::new(&bs);
        assert!(it.next());
        assert_eq!(it.value(), doc_id::MIN + 3);
        assert!(it.next());
        assert_eq!(it.value(), doc_id::MIN + 200);
        assert!(!it.next());
    }

    #[test]
    fn test_seek_tracks_document_attribute() {
        let bs = all_set(64);
        let mut it = BitsetDocIterator::new(&bs);
        let doc = it.attributes().get::<Document>().unwrap();
        assert!(!doc_id::valid(doc.borrow().value));
        it.seek(10);
        assert_eq!(doc.borrow().value, 10);
        it.next();
        assert_eq!(doc.borrow().value, 11);
    }

    #[test]
    fn test_owned_bitset() {
        let mut bs = BitSet::new(8);
        bs.set(2);
        let mut it = BitsetDocIterator::from_owned(bs);
        assert!(it.next());
        assert_eq!(it.value(), doc_id::MIN + 2);
        assert!(!it.next());
    }
}
