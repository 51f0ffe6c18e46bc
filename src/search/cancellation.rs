//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::attribute::AttributeView;
use crate::doc_id::{self, DocId};
use crate::iterator::DocIterator;

/// A cheap, cloneable cancellation token.
///
/// The default token can never be cancelled; an active token is created
/// with [`Cancellation::new`] and shared by cloning. Execution polls the
/// token at every iterator advance and settles on `EOF` once it trips.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Option<Arc<AtomicBool>>,
}

impl Cancellation {
    /// An active token, initially not cancelled.
    pub fn new() -> Self {
        Cancellation {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// A token that can never be cancelled.
    pub fn none() -> Self {
        Cancellation::default()
    }

    /// Trip the token. A no-op on an inactive token.
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Release);
        }
    }

    /// Whether the token has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Whether this token can be cancelled at all.
    pub fn is_active(&self) -> bool {
        self.flag.is_some()
    }
}

/// Polls a cancellation token on every advance of the wrapped iterator.
pub struct CancellableDocIterator {
    inner: Box<dyn DocIterator>,
    cancel: Cancellation,
    done: bool,
}

impl CancellableDocIterator {
    /// Wrap `inner` so it terminates once `cancel` trips.
    pub fn new(inner: Box<dyn DocIterator>, cancel: Cancellation) -> Self {
        CancellableDocIterator {
            inner,
            cancel,
            done: false,
        }
    }
}

impl DocIterator for CancellableDocIterator {
    fn value(&self) -> DocId {
        if self.done {
            doc_id::EOF
        } else {
            self.inner.value()
        }
    }

    fn next(&mut self) -> bool {
        if self.done {
            return false;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return false;
        }
        self.inner.next()
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if self.done {
            return doc_id::EOF;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return doc_id::EOF;
        }
        self.inner.seek(target)
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.inner.attributes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::bitset::BitsetDocIterator;
    use crate::util::bitset::BitSet;

    #[test]
    fn test_inactive_token() {
        let cancel = Cancellation::none();
        assert!(!cancel.is_active());
        cancel.cancel();
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_cancellation_mid_iteration() {
        let mut bits = BitSet::new(10);
        for i in 0..10 {
            bits.set(i);
        }
        let cancel = Cancellation::new();
        let mut it = CancellableDocIterator::new(
            Box::new(BitsetDocIterator::from_owned(bits)),
            cancel.clone(),
        );

        assert!(it.next());
        assert_eq!(it.value(), 1);

        cancel.cancel();
        assert!(!it.next());
        assert!(doc_id::is_eof(it.value()));
        assert_eq!(it.seek(5), doc_id::EOF);
    }
}
