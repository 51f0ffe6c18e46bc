//! Bitset document iterator behavior over dense and sparse sets.

use sagitta::DocIterator;
use sagitta::attribute::kinds::Cost;
use sagitta::doc_id;
use sagitta::iterator::bitset::BitsetDocIterator;
use sagitta::util::bitset::{BitSet, WORD_BITS};

fn dense(capacity: usize) -> BitSet {
    let mut bits = BitSet::new(capacity);
    bits.memset(&vec![!0u64; capacity.div_ceil(WORD_BITS)]);
    bits
}

fn odd_bits(capacity: usize) -> BitSet {
    let mut bits = BitSet::new(capacity);
    for i in 0..capacity {
        bits.reset(i, i % 2 != 0);
    }
    bits
}

#[test]
fn test_next_empty_bitset() {
    let bits = BitSet::new(0);
    let mut it = BitsetDocIterator::new(&bits);
    assert!(doc_id::is_eof(it.value()));
    assert_eq!(Cost::extract(it.attributes(), u64::MAX), 0);

    assert!(!it.next());
    assert!(doc_id::is_eof(it.value()));
    assert!(!it.next());
    assert!(doc_id::is_eof(it.value()));
}

#[test]
fn test_next_no_bits_set() {
    let bits = BitSet::new(13);
    let mut it = BitsetDocIterator::new(&bits);
    assert!(doc_id::is_eof(it.value()));
    assert_eq!(Cost::extract(it.attributes(), u64::MAX), 0);

    assert!(!it.next());
    assert!(doc_id::is_eof(it.value()));
}

#[test]
fn test_next_dense() {
    let size = 73u32;
    let bits = dense(size as usize);
    let mut it = BitsetDocIterator::new(&bits);
    assert!(!doc_id::valid(it.value()));
    assert_eq!(Cost::extract(it.attributes(), 0), u64::from(size));

    for i in 0..size {
        assert!(it.next());
        assert_eq!(it.value(), doc_id::MIN + i);
    }
    assert!(!it.next());
    assert!(doc_id::is_eof(it.value()));
}

#[test]
fn test_next_sparse() {
    let size = 176u32;
    let bits = odd_bits(size as usize);
    let mut it = BitsetDocIterator::new(&bits);
    assert!(!doc_id::valid(it.value()));
    assert_eq!(Cost::extract(it.attributes(), 0), u64::from(size / 2));

    let mut i = 1;
    while i < size {
        assert!(it.next());
        assert_eq!(it.value(), doc_id::MIN + i);
        i += 2;
    }
    assert!(!it.next());
    assert!(doc_id::is_eof(it.value()));
}

#[test]
fn test_seek_empty_bitset() {
    let bits = BitSet::new(0);
    let mut it = BitsetDocIterator::new(&bits);
    assert!(doc_id::is_eof(it.seek(1)));
    assert!(doc_id::is_eof(it.value()));
    assert!(!it.next());
}

#[test]
fn test_seek_dense() {
    let size = 173u32;
    let bits = dense(size as usize);
    let mut it = BitsetDocIterator::new(&bits);

    for expected in doc_id::MIN..=size {
        assert_eq!(it.seek(expected), expected);
        assert_eq!(it.value(), expected);
    }
    assert!(!it.next());
    assert!(doc_id::is_eof(it.value()));
}

#[test]
fn test_seek_backwards_returns_current() {
    let size = 173u32;
    let bits = dense(size as usize);

    let mut it = BitsetDocIterator::new(&bits);
    assert_eq!(it.seek(size), size);
    for target in (doc_id::MIN..size).rev() {
        assert_eq!(it.seek(target), size, "no backward movement");
    }
    assert_eq!(it.seek(doc_id::INVALID), size);
}

#[test]
fn test_seek_past_end() {
    let size = 173u32;
    let bits = dense(size as usize);
    let mut it = BitsetDocIterator::new(&bits);
    assert!(doc_id::is_eof(it.seek(size + 1)));
}

#[test]
fn test_seek_to_last_document() {
    let size = 173u32;
    let bits = dense(size as usize);
    let mut it = BitsetDocIterator::new(&bits);
    assert_eq!(it.seek(size), size);
}

#[test]
fn test_seek_to_eof() {
    let size = 173u32;
    let bits = dense(size as usize);
    let mut it = BitsetDocIterator::new(&bits);
    assert!(doc_id::is_eof(it.seek(doc_id::EOF)));
}

#[test]
fn test_seek_before_first_document() {
    let size = 173u32;
    let bits = dense(size as usize);
    let mut it = BitsetDocIterator::new(&bits);
    assert_eq!(it.seek(doc_id::INVALID), doc_id::MIN);
}

#[test]
fn test_seek_sparse() {
    let size = 176u32;
    let bits = odd_bits(size as usize);
    let mut it = BitsetDocIterator::new(&bits);

    let mut i = 1;
    while i < size {
        let expected = doc_id::MIN + i;
        assert_eq!(it.seek(expected - 1), expected);
        assert_eq!(it.value(), expected);
        assert_eq!(it.seek(expected), expected);
        assert_eq!(it.value(), expected);
        i += 2;
    }
    assert!(!it.next());
    assert!(doc_id::is_eof(it.value()));
}

#[test]
fn test_seek_next_interleaved() {
    let size = 173u32;
    let bits = dense(size as usize);
    let mut it = BitsetDocIterator::new(&bits);

    let steps = 5;
    let mut expected = doc_id::MIN;
    while expected <= size {
        assert_eq!(it.seek(expected), expected);
        assert_eq!(it.value(), expected);

        let mut j = 1;
        while j <= steps && it.next() {
            assert_eq!(it.value(), expected + j);
            j += 1;
        }
        if doc_id::is_eof(it.value()) {
            break;
        }
        // Catch the loop variable up with the cursor.
        expected = it.value() + 1;
    }
}

#[test]
fn test_monotonic_sequence_property() {
    // Emitted values strictly increase and terminate at EOF.
    let bits = odd_bits(97);
    let mut it = BitsetDocIterator::new(&bits);
    let mut previous = doc_id::INVALID;
    while it.next() {
        assert!(doc_id::valid(it.value()));
        assert!(it.value() > previous);
        previous = it.value();
    }
    assert!(doc_id::is_eof(it.value()));
}
