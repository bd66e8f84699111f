//! The reference dictionary consumed by the binary decoder and SAM parser.
//!
//! Header binary decoding is a collaborator concern; records only need an
//! ordered array of references indexable by non-negative id plus a by-name
//! lookup. References are shared into records as `Arc<Reference>` so that a
//! record never outlives the dictionary entry it points at.

use std::sync::Arc;

use ahash::AHashMap;

/// A named contiguous sequence against which alignments are made.
///
/// An id below zero denotes an unplaced or synthesized reference (for
/// example one invented by the headerless SAM parser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    id: i32,
    name: String,
    length: i32,
}

impl Reference {
    /// Create a reference with the given id, name, and sequence length.
    #[must_use]
    pub fn new(id: i32, name: impl Into<String>, length: i32) -> Self {
        Self { id, name: name.into(), length }
    }

    /// A placeholder for a name seen without a header; id is -1.
    #[must_use]
    pub(crate) fn placeholder(name: &str) -> Arc<Self> {
        Arc::new(Self { id: -1, name: name.to_string(), length: 0 })
    }

    /// The reference id (its index in the owning header), or -1 if unplaced.
    #[inline]
    #[must_use]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// The reference sequence name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reference sequence length in bases.
    #[inline]
    #[must_use]
    pub fn length(&self) -> i32 {
        self.length
    }
}

/// The reference dictionary: an ordered, id-indexed set of references with
/// name lookup.
#[derive(Debug, Default)]
pub struct Header {
    refs: Vec<Arc<Reference>>,
    by_name: AHashMap<String, usize>,
}

impl Header {
    /// Create an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from `(name, length)` pairs; ids are assigned in order.
    #[must_use]
    pub fn from_references<I, S>(refs: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut header = Self::new();
        for (name, length) in refs {
            header.add_reference(name, length);
        }
        header
    }

    /// Append a reference, assigning it the next id. Returns the shared entry.
    pub fn add_reference(&mut self, name: impl Into<String>, length: i32) -> Arc<Reference> {
        let name = name.into();
        let id = self.refs.len() as i32;
        let reference = Arc::new(Reference::new(id, name.clone(), length));
        self.by_name.insert(name, self.refs.len());
        self.refs.push(Arc::clone(&reference));
        reference
    }

    /// The ordered reference array, indexable by non-negative id.
    #[inline]
    #[must_use]
    pub fn references(&self) -> &[Arc<Reference>] {
        &self.refs
    }

    /// Look up a reference by id. Negative or out-of-range ids return `None`.
    #[must_use]
    pub fn reference(&self, id: i32) -> Option<&Arc<Reference>> {
        usize::try_from(id).ok().and_then(|i| self.refs.get(i))
    }

    /// Look up a reference by name.
    #[must_use]
    pub fn reference_by_name(&self, name: &str) -> Option<&Arc<Reference>> {
        self.by_name.get(name).map(|&i| &self.refs[i])
    }
}
