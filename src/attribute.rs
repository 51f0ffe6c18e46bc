//! Typed, heterogeneous attribute storage.
//!
//! Attributes are the side-channel by which analysis, indexing and search
//! components exchange per-token and per-iterator state: a token stream
//! publishes its term bytes and position increment, a postings iterator its
//! current document and frequency, a scored iterator its score evaluator.
//! Each attribute type is keyed by its runtime type identity
//! ([`std::any::TypeId`]); membership is sparse and lookups are O(1).
//!
//! Values live in [`Rc<RefCell<T>>`] cells: the producing iterator keeps a
//! mutating handle while consumers hold read handles obtained through
//! [`AttributeStore::get`] or an [`AttributeView`]. The iterator algebra is
//! single-threaded per query, so shared interior mutability is safe here.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::{Result, SagittaError};

pub mod kinds;

/// A typed piece of per-token or per-iterator state.
///
/// Implementations are plain data; `clear` returns the value to its
/// between-tokens default.
pub trait Attribute: Any {
    /// Reset the value to its default state.
    fn clear(&mut self);
}

/// Shared handle to an attribute value.
///
/// The producer mutates through its handle on each advance; any reference
/// read out of a handle is only meaningful until the next mutating call on
/// the owning iterator.
pub type AttrRef<T> = Rc<RefCell<T>>;

/// Type-erased handle, used by [`AttributeStore::visit`].
pub type ErasedAttrRef = Rc<RefCell<dyn Attribute>>;

#[derive(Clone)]
struct Entry {
    /// `Rc<RefCell<T>>` behind `dyn Any`, for typed retrieval.
    typed: Rc<dyn Any>,
    /// The same cell, erased for visitation and bulk clearing.
    erased: ErasedAttrRef,
}

/// An owning map from attribute type identity to attribute value.
#[derive(Default)]
pub struct AttributeStore {
    entries: AHashMap<TypeId, Entry>,
}

impl AttributeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        AttributeStore::default()
    }

    /// Insert a default-constructed `T`, failing if one is already present.
    pub fn add<T: Attribute + Default>(&mut self) -> Result<AttrRef<T>> {
        if self.entries.contains_key(&TypeId::of::<T>()) {
            return Err(SagittaError::already_present(std::any::type_name::<T>()));
        }
        Ok(self.insert(T::default()))
    }

    /// Insert `value`, replacing any existing attribute of the same type.
    pub fn emplace<T: Attribute>(&mut self, value: T) -> AttrRef<T> {
        self.insert(value)
    }

    /// Look up the attribute of type `T`, if present.
    pub fn get<T: Attribute>(&self) -> Option<AttrRef<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.typed.downcast_ref::<AttrRef<T>>())
            .cloned()
    }

    /// Whether an attribute of type `T` is present.
    pub fn contains<T: Attribute>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Remove the attribute of type `T`. Returns whether one was present.
    pub fn remove<T: Attribute>(&mut self) -> bool {
        self.entries.remove(&TypeId::of::<T>()).is_some()
    }

    /// Visit every entry in unspecified order. The visitor returns `false`
    /// to terminate early; the overall result is `false` iff it did.
    pub fn visit(&self, mut visitor: impl FnMut(TypeId, &ErasedAttrRef) -> bool) -> bool {
        for (type_id, entry) in &self.entries {
            if !visitor(*type_id, &entry.erased) {
                return false;
            }
        }
        true
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Reset every stored value to its default state, keeping membership.
    pub fn clear_values(&self) {
        for entry in self.entries.values() {
            entry.erased.borrow_mut().clear();
        }
    }

    /// Number of stored attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A read-only view over this store.
    pub fn view(&self) -> AttributeView<'_> {
        AttributeView { store: self }
    }

    /// Share every attribute visible through `view` into this store.
    ///
    /// Linked entries alias the originating cells, so a value mutated by the
    /// producer is seen through both stores. Existing entries of the same
    /// type are replaced. Wrapping iterators use this to re-expose their
    /// inner iterator's attributes alongside their own.
    pub fn link_from(&mut self, view: AttributeView<'_>) {
        for (type_id, entry) in &view.store.entries {
            self.entries.insert(*type_id, entry.clone());
        }
    }

    fn insert<T: Attribute>(&mut self, value: T) -> AttrRef<T> {
        let cell: AttrRef<T> = Rc::new(RefCell::new(value));
        let erased: ErasedAttrRef = cell.clone();
        self.entries.insert(
            TypeId::of::<T>(),
            Entry {
                typed: Rc::new(cell.clone()),
                erased,
            },
        );
        cell
    }
}

impl std::fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeStore")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// A read-only facade over an [`AttributeStore`].
///
/// Views expose lookup and visitation but not insertion or removal; this is
/// what iterators hand to their consumers.
#[derive(Debug, Clone, Copy)]
pub struct AttributeView<'a> {
    store: &'a AttributeStore,
}

impl<'a> AttributeView<'a> {
    /// Look up the attribute of type `T`, if present.
    pub fn get<T: Attribute>(&self) -> Option<AttrRef<T>> {
        self.store.get::<T>()
    }

    /// Whether an attribute of type `T` is present.
    pub fn contains<T: Attribute>(&self) -> bool {
        self.store.contains::<T>()
    }

    /// Visit every entry in unspecified order; see [`AttributeStore::visit`].
    pub fn visit(&self, visitor: impl FnMut(TypeId, &ErasedAttrRef) -> bool) -> bool {
        self.store.visit(visitor)
    }

    /// Number of visible attributes.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the view exposes no attributes.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
