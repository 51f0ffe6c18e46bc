//! Conjunction combinator: documents matching every input.

use crate::attribute::kinds::{Cost, Document};
use crate::attribute::{AttrRef, AttributeStore, AttributeView};
use crate::doc_id::{self, DocId};
use crate::iterator::{DocIterator, empty};
use crate::search::sort::{PreparedOrder, Score, iterator_cost};

/// Compose `children` into an iterator over their intersection.
///
/// Children are sorted by ascending cost so the cheapest input leads; the
/// composed cost is the minimum input cost and the composed score is the
/// scorer-wise sum of the inputs' scores.
pub fn conjunction(
    mut children: Vec<Box<dyn DocIterator>>,
    order: &PreparedOrder,
) -> Box<dyn DocIterator> {
    match children.len() {
        0 => return empty(),
        1 => return children.remove(0),
        _ => {}
    }
    children.sort_by_key(|child| iterator_cost(child.as_ref()));
    Box::new(Conjunction::new(children, order))
}

struct Conjunction {
    children: Vec<Box<dyn DocIterator>>,
    value: DocId,
    attrs: AttributeStore,
    doc: AttrRef<Document>,
}

impl Conjunction {
    fn new(children: Vec<Box<dyn DocIterator>>, order: &PreparedOrder) -> Self {
        let mut attrs = AttributeStore::new();
        attrs.emplace(Cost {
            estimate: iterator_cost(children[0].as_ref()),
        });
        let doc = attrs.emplace(Document::default());

        if !order.is_empty() {
            let scores: Vec<AttrRef<Score>> = children
                .iter()
                .filter_map(|child| child.attributes().get::<Score>())
                .collect();
            let order = order.clone();
            attrs.emplace(Score::new(
                order.score_size(),
                Box::new(move |dst| {
                    dst.fill(0);
                    for score in &scores {
                        order.add(dst, score.borrow_mut().evaluate());
                    }
                }),
            ));
        }

        Conjunction {
            children,
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

    /// Drive every input to agreement on a document `>= target`.
    fn align(&mut self, mut target: DocId) -> DocId {
        'outer: loop {
            if doc_id::is_eof(target) {
                return self.settle(doc_id::EOF);
            }
            for i in 1..self.children.len() {
                let got = self.children[i].seek(target);
                if got != target {
                    // The lead re-seeks to the overshoot and the round
                    // restarts.
                    target = if doc_id::is_eof(got) {
                        doc_id::EOF
                    } else {
                        self.children[0].seek(got)
                    };
                    continue 'outer;
                }
            }
            return self.settle(target);
        }
    }
}

impl DocIterator for Conjunction {
    fn value(&self) -> DocId {
        self.value
    }

    fn next(&mut self) -> bool {
        if doc_id::is_eof(self.value) {
            return false;
        }
        let target = if self.children[0].next() {
            self.children[0].value()
        } else {
            doc_id::EOF
        };
        !doc_id::is_eof(self.align(target))
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_id::is_eof(self.value) {
            return self.value;
        }
        if doc_id::valid(self.value) && target <= self.value {
            return self.value;
        }
        let lead = self.children[0].seek(target);
        self.align(lead)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}
