//! # Sagitta
//!
//! The core of an inverted-index search engine: immutable segments behind
//! reader traits, a composable document-iterator algebra, and a
//! prepare/execute query layer with pluggable scoring.
//!
//! ## Features
//!
//! - Typed per-token and per-iterator attribute side-channel
//! - Lazily composable document iterators with skip support
//! - Conjunction, disjunction (K-of-N), exclusion and boost combinators
//! - Term, prefix, range, phrase, column and boolean filters
//! - Prepared queries with per-segment execution and cooperative
//!   cancellation
//! - Named scorer registry with BM25 and TF-IDF built in
//!
//! ## Example
//!
//! ```
//! use sagitta::analysis::ArrayTokenStream;
//! use sagitta::index::field::IndexFeatures;
//! use sagitta::index::memory::{MemoryIndex, MemorySegmentWriter};
//! use sagitta::index::reader::IndexReader;
//! use sagitta::search::filter::{ExecutionContext, Filter};
//! use sagitta::search::sort::{NO_BOOST, PreparedOrder};
//! use sagitta::search::term_filter::ByTerm;
//! use sagitta::DocIterator;
//!
//! # fn main() -> sagitta::Result<()> {
//! let mut writer = MemorySegmentWriter::new();
//! let mut doc = writer.insert();
//! doc.index_field(
//!     "body",
//!     IndexFeatures::FREQ,
//!     &mut ArrayTokenStream::from_terms(&["hello", "world"]),
//! )?;
//! doc.commit();
//!
//! let mut index = MemoryIndex::new();
//! index.add_segment(writer.build());
//!
//! let order = PreparedOrder::empty();
//! let prepared = ByTerm::new("body", "hello").prepare(&index, &order, NO_BOOST)?;
//! let mut docs = prepared.execute(&ExecutionContext::new(index.segment(0), &order))?;
//! assert!(docs.next());
//! assert_eq!(docs.value(), 1);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod attribute;
pub mod doc_id;
mod error;
pub mod index;
pub mod iterator;
pub mod search;
pub mod util;

// Re-exports for the public API
pub use attribute::{AttrRef, Attribute, AttributeStore, AttributeView};
pub use doc_id::DocId;
pub use error::{Result, SagittaError};
pub use iterator::{DocIterator, PositionIterator};
pub use search::cancellation::Cancellation;
pub use search::filter::{ExecutionContext, Filter, PreparedFilter};
pub use search::sort::{Boost, NO_BOOST, Order, PreparedOrder, Scorer};
pub use util::bytes::BytesRef;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
