//! Disjunction combinator: documents matching any input, with optional
//! K-of-N matching.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::attribute::kinds::{Cost, Document};
use crate::attribute::{AttrRef, AttributeStore, AttributeView};
use crate::doc_id::{self, DocId};
use crate::iterator::{DocIterator, empty};
use crate::search::sort::{PreparedOrder, Score, iterator_cost};

/// Compose `children` into an iterator over their union.
pub fn disjunction(
    children: Vec<Box<dyn DocIterator>>,
    order: &PreparedOrder,
) -> Box<dyn DocIterator> {
    min_match_disjunction(children, 1, order)
}

/// Compose `children` into an iterator over documents matched by at least
/// `min_match` of them.
///
/// The composed cost is the sum of input costs; the composed score is the
/// scorer-wise sum over the inputs positioned on the emitted document.
pub fn min_match_disjunction(
    mut children: Vec<Box<dyn DocIterator>>,
    min_match: usize,
    order: &PreparedOrder,
) -> Box<dyn DocIterator> {
    let min_match = min_match.max(1);
    if children.is_empty() || min_match > children.len() {
        return empty();
    }
    if children.len() == 1 {
        return children.remove(0);
    }
    Box::new(Disjunction::new(children, min_match, order))
}

/// Min-heap entry keyed by document id.
struct HeapEntry {
    doc: DocId,
    idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.doc == other.doc && self.idx == other.idx
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we need the smallest doc on
        // top.
        other
            .doc
            .cmp(&self.doc)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Disjunction {
    children: Vec<Box<dyn DocIterator>>,
    heap: BinaryHeap<HeapEntry>,
    /// Children positioned on the current document (pre-first: all of
    /// them).
    current: Vec<usize>,
    min_match: usize,
    value: DocId,
    attrs: AttributeStore,
    doc: AttrRef<Document>,
}

impl Disjunction {
    fn new(children: Vec<Box<dyn DocIterator>>, min_match: usize, order: &PreparedOrder) -> Self {
        let mut attrs = AttributeStore::new();
        let cost = children
            .iter()
            .fold(0u64, |sum, child| {
                sum.saturating_add(iterator_cost(child.as_ref()))
            });
        attrs.emplace(Cost { estimate: cost });
        let doc = attrs.emplace(Document::default());

        if !order.is_empty() {
            // Sum the scores of the inputs that produced the current
            // document; input membership is recovered by comparing
            // document attributes.
            let members: Vec<(AttrRef<Document>, AttrRef<Score>)> = children
                .iter()
                .filter_map(|child| {
                    let attrs = child.attributes();
                    attrs.get::<Document>().zip(attrs.get::<Score>())
                })
                .collect();
            let own_doc = doc.clone();
            let order = order.clone();
            attrs.emplace(Score::new(
                order.score_size(),
                Box::new(move |dst| {
                    dst.fill(0);
                    let current = own_doc.borrow().value;
                    for (member_doc, member_score) in &members {
                        if member_doc.borrow().value == current {
                            order.add(dst, member_score.borrow_mut().evaluate());
                        }
                    }
                }),
            ));
        }

        let current = (0..children.len()).collect();
        Disjunction {
            children,
            heap: BinaryHeap::new(),
            current,
            min_match,
            value: doc_id::INVALID,
            attrs,
            doc,
        }
    }

    fn settle(&mut self, value: DocId) -> DocId {
        self.value = value;
        self.doc.borrow_mut().value = value;
        value
    }

    /// Advance every member of the current match and return it to the heap.
    fn advance_current(&mut self) {
        for idx in self.current.drain(..) {
            if self.children[idx].next() {
                self.heap.push(HeapEntry {
                    doc: self.children[idx].value(),
                    idx,
                });
            }
        }
    }

    /// Pop the heap's minimum and everything equal to it into `current`.
    fn gather(&mut self) -> Option<DocId> {
        let top = self.heap.peek()?.doc;
        while self.heap.peek().is_some_and(|entry| entry.doc == top) {
            if let Some(entry) = self.heap.pop() {
                self.current.push(entry.idx);
            }
        }
        Some(top)
    }

    /// Settle on the next document matched by at least `min_match` inputs.
    fn resolve(&mut self) -> bool {
        loop {
            match self.gather() {
                None => {
                    self.settle(doc_id::EOF);
                    return false;
                }
                Some(value) if self.current.len() >= self.min_match => {
                    self.settle(value);
                    return true;
                }
                Some(_) => self.advance_current(),
            }
        }
    }
}

impl DocIterator for Disjunction {
    fn value(&self) -> DocId {
        self.value
    }

    fn next(&mut self) -> bool {
        if doc_id::is_eof(self.value) {
            return false;
        }
        self.advance_current();
        self.resolve()
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_id::is_eof(self.value) {
            return self.value;
        }
        if doc_id::valid(self.value) && target <= self.value {
            return self.value;
        }

        // Move the current members and every heap entry below the target.
        for idx in self.current.drain(..) {
            let got = self.children[idx].seek(target);
            if !doc_id::is_eof(got) {
                self.heap.push(HeapEntry { doc: got, idx });
            }
        }
        while self.heap.peek().is_some_and(|entry| entry.doc < target) {
            if let Some(entry) = self.heap.pop() {
                let got = self.children[entry.idx].seek(target);
                if !doc_id::is_eof(got) {
                    self.heap.push(HeapEntry {
                        doc: got,
                        idx: entry.idx,
                    });
                }
            }
        }
        self.resolve();
        self.value
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::bitset::BitsetDocIterator;
    use crate::util::bitset::BitSet;

    fn docs(ids: &[DocId]) -> Box<dyn DocIterator> {
        let mut bits = BitSet::new(32);
        for &id in ids {
            bits.set((id - doc_id::MIN) as usize);
        }
        Box::new(BitsetDocIterator::from_owned(bits))
    }

    fn drain(mut it: Box<dyn DocIterator>) -> Vec<DocId> {
        let mut out = Vec::new();
        while it.next() {
            out.push(it.value());
        }
        out
    }

    #[test]
    fn test_union() {
        let it = disjunction(
            vec![docs(&[1, 4]), docs(&[2, 4, 6])],
            &PreparedOrder::empty(),
        );
        assert_eq!(Cost::extract(it.attributes(), 0), 5);
        assert_eq!(drain(it), vec![1, 2, 4, 6]);
    }

    #[test]
    fn test_union_with_duplicates_across_inputs() {
        let it = disjunction(
            vec![docs(&[1, 2, 3]), docs(&[1, 2, 3]), docs(&[3, 9])],
            &PreparedOrder::empty(),
        );
        assert_eq!(drain(it), vec![1, 2, 3, 9]);
    }

    #[test]
    fn test_min_match() {
        // 2, 6 appear in two inputs; 4 in all three; the rest in one.
        let inputs = || {
            vec![
                docs(&[1, 2, 4]),
                docs(&[2, 4, 6]),
                docs(&[3, 4, 6]),
            ]
        };
        let two_of_three = min_match_disjunction(inputs(), 2, &PreparedOrder::empty());
        assert_eq!(drain(two_of_three), vec![2, 4, 6]);

        let all_three = min_match_disjunction(inputs(), 3, &PreparedOrder::empty());
        assert_eq!(drain(all_three), vec![4]);
    }

    #[test]
    fn test_min_match_above_input_count_is_empty() {
        let mut it = min_match_disjunction(
            vec![docs(&[1]), docs(&[2])],
            3,
            &PreparedOrder::empty(),
        );
        assert!(!it.next());
        assert!(doc_id::is_eof(it.value()));
    }

    #[test]
    fn test_seek() {
        let mut it = disjunction(
            vec![docs(&[1, 4, 9]), docs(&[2, 4, 6])],
            &PreparedOrder::empty(),
        );
        assert_eq!(it.seek(3), 4);
        assert_eq!(it.seek(3), 4, "seek never moves backward");
        assert_eq!(it.seek(5), 6);
        assert!(it.next());
        assert_eq!(it.value(), 9);
        assert!(!it.next());
    }

    #[test]
    fn test_seek_with_min_match() {
        let mut it = min_match_disjunction(
            vec![docs(&[1, 2, 4]), docs(&[2, 4, 6]), docs(&[3, 4, 6])],
            2,
            &PreparedOrder::empty(),
        );
        assert_eq!(it.seek(3), 4);
        assert!(it.next());
        assert_eq!(it.value(), 6);
        assert!(!it.next());
    }
}
