//! Evaluation-time score scaling.

use crate::attribute::{AttributeStore, AttributeView};
use crate::doc_id::DocId;
use crate::iterator::DocIterator;
use crate::search::sort::{Boost, PreparedOrder, Score};

/// Wraps an iterator and multiplies its evaluated score by a constant.
///
/// The wrapped iterator's other attributes are re-exposed unchanged; if it
/// carries no score, the wrapper is a transparent pass-through.
pub struct BoostedDocIterator {
    inner: Box<dyn DocIterator>,
    attrs: AttributeStore,
}

impl BoostedDocIterator {
    /// Scale `inner`'s score by `factor` at evaluation time.
    pub fn new(inner: Box<dyn DocIterator>, order: &PreparedOrder, factor: Boost) -> Self {
        let mut attrs = AttributeStore::new();
        attrs.link_from(inner.attributes());
        if let Some(score) = inner.attributes().get::<Score>() {
            let order = order.clone();
            attrs.emplace(Score::new(
                order.score_size(),
                Box::new(move |dst| {
                    let mut inner_score = score.borrow_mut();
                    dst.copy_from_slice(inner_score.evaluate());
                    order.scale(dst, factor);
                }),
            ));
        }
        BoostedDocIterator { inner, attrs }
    }
}

impl DocIterator for BoostedDocIterator {
    fn value(&self) -> DocId {
        self.inner.value()
    }

    fn next(&mut self) -> bool {
        self.inner.next()
    }

    fn seek(&mut self, target: DocId) -> DocId {
        self.inner.seek(target)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::bitset::BitsetDocIterator;
    use crate::search::bm25::BM25;
    use crate::search::sort::{Order, ScoredDocIterator};
    use crate::util::bitset::BitSet;

    #[test]
    fn test_boost_scales_evaluated_score() {
        let order = Order::new().with(Box::new(BM25::default())).prepare();

        let mut bits = BitSet::new(4);
        bits.set(0);
        bits.set(2);
        let inner = Box::new(ScoredDocIterator::constant(
            Box::new(BitsetDocIterator::from_owned(bits)),
            &order,
            1.5,
        ));

        let mut boosted = BoostedDocIterator::new(inner, &order, 2.0);
        assert!(boosted.next());
        assert_eq!(boosted.value(), 1);

        let score = boosted.attributes().get::<Score>().unwrap();
        let buf = score.borrow_mut().evaluate().to_vec();
        let value = f32::from_le_bytes(buf.try_into().unwrap());
        assert_eq!(value, 3.0);
    }

    #[test]
    fn test_unscored_inner_passes_through() {
        let order = PreparedOrder::empty();
        let mut bits = BitSet::new(4);
        bits.set(1);
        let inner: Box<dyn DocIterator> = Box::new(BitsetDocIterator::from_owned(bits));

        let mut boosted = BoostedDocIterator::new(inner, &order, 4.0);
        assert!(boosted.attributes().get::<Score>().is_none());
        assert!(boosted.next());
        assert_eq!(boosted.value(), 2);
        assert!(!boosted.next());
    }
}
