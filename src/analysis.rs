//! Token stream contract.
//!
//! Analyzers live outside this crate; what matters here is the attribute
//! contract a token stream must satisfy so the writer can consume it. A
//! stream publishes [`TermAttr`] (token bytes) and [`Increment`] (position
//! delta), and optionally [`Offset`] and [`Payload`]; the writer reads these
//! through the stream's attribute view after every successful advance.

use crate::attribute::kinds::{Increment, Offset, Payload, TermAttr};
use crate::attribute::{AttrRef, AttributeStore, AttributeView};

/// A stream of analyzed tokens.
pub trait TokenStream {
    /// Advance to the next token, refreshing the published attributes.
    fn next(&mut self) -> bool;

    /// The attributes describing the current token.
    fn attributes(&self) -> AttributeView<'_>;
}

/// One pre-analyzed token for [`ArrayTokenStream`].
#[derive(Debug, Clone)]
pub struct TokenSpec {
    bytes: Vec<u8>,
    increment: u32,
    offset: Option<(u32, u32)>,
    payload: Vec<u8>,
}

impl TokenSpec {
    /// A token with the given bytes, one position past its predecessor.
    pub fn new<B: AsRef<[u8]>>(bytes: B) -> Self {
        TokenSpec {
            bytes: bytes.as_ref().to_vec(),
            increment: 1,
            offset: None,
            payload: Vec::new(),
        }
    }

    /// Override the position increment (0 stacks onto the previous
    /// position).
    pub fn with_increment(mut self, increment: u32) -> Self {
        self.increment = increment;
        self
    }

    /// Attach byte offsets.
    pub fn with_offset(mut self, start: u32, end: u32) -> Self {
        self.offset = Some((start, end));
        self
    }

    /// Attach payload bytes.
    pub fn with_payload<B: AsRef<[u8]>>(mut self, payload: B) -> Self {
        self.payload = payload.as_ref().to_vec();
        self
    }
}

/// A token stream over a pre-analyzed token array.
///
/// Hosts with real analyzers implement [`TokenStream`] themselves; this
/// stream covers programmatic indexing and tests.
pub struct ArrayTokenStream {
    attrs: AttributeStore,
    term: AttrRef<TermAttr>,
    increment: AttrRef<Increment>,
    offset: AttrRef<Offset>,
    payload: AttrRef<Payload>,
    tokens: std::vec::IntoIter<TokenSpec>,
}

impl ArrayTokenStream {
    /// Stream the given tokens.
    pub fn new(tokens: Vec<TokenSpec>) -> Self {
        let mut attrs = AttributeStore::new();
        let term = attrs.emplace(TermAttr::default());
        let increment = attrs.emplace(Increment::default());
        let offset = attrs.emplace(Offset::default());
        let payload = attrs.emplace(Payload::default());
        ArrayTokenStream {
            attrs,
            term,
            increment,
            offset,
            payload,
            tokens: tokens.into_iter(),
        }
    }

    /// Stream one token per term, at consecutive positions.
    pub fn from_terms<S: AsRef<[u8]>>(terms: &[S]) -> Self {
        ArrayTokenStream::new(terms.iter().map(TokenSpec::new).collect())
    }
}

impl TokenStream for ArrayTokenStream {
    fn next(&mut self) -> bool {
        let Some(token) = self.tokens.next() else {
            return false;
        };
        self.term.borrow_mut().set(&token.bytes);
        self.increment.borrow_mut().value = token.increment;
        let (start, end) = token.offset.unwrap_or((0, 0));
        *self.offset.borrow_mut() = Offset { start, end };
        self.payload.borrow_mut().value = token.payload;
        true
    }

    fn attributes(&self) -> AttributeView<'_> {
        self.attrs.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_publishes_token_attributes() {
        let mut stream = ArrayTokenStream::new(vec![
            TokenSpec::new("quick").with_offset(0, 5),
            TokenSpec::new("fast").with_increment(0).with_offset(0, 5),
            TokenSpec::new("fox").with_offset(6, 9).with_payload([0x01]),
        ]);

        let term = stream.attributes().get::<TermAttr>().unwrap();
        let inc = stream.attributes().get::<Increment>().unwrap();
        let offset = stream.attributes().get::<Offset>().unwrap();
        let payload = stream.attributes().get::<Payload>().unwrap();

        assert!(stream.next());
        assert_eq!(term.borrow().bytes(), b"quick");
        assert_eq!(inc.borrow().value, 1);

        assert!(stream.next());
        assert_eq!(term.borrow().bytes(), b"fast");
        assert_eq!(inc.borrow().value, 0, "synonym stacks on previous position");
        assert_eq!(*offset.borrow(), Offset { start: 0, end: 5 });

        assert!(stream.next());
        assert_eq!(term.borrow().bytes(), b"fox");
        assert_eq!(payload.borrow().value, vec![0x01]);

        assert!(!stream.next());
    }
}
