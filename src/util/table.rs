use std::borrow::Borrow;
use std::fmt::Debug;

use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("lookup table has no entries")]
    Empty,

    /// A contiguous table saw `found` where the next key had to be `expected`.
    #[error("table keys must be contiguous: expected key {expected}, found {found}")]
    NotContiguous { expected: usize, found: usize },

    #[error("duplicate key {0} in lookup table")]
    DuplicateKey(String),
}

// =============================================================================
// StaticMap - sorted, binary-searched
// =============================================================================

/// Read-only table built once from a literal list of pairs.
///
/// Entries are sorted by key at construction and looked up by binary search,
/// so keys can be sparse or non-integer (mnemonics, wire codes with gaps).
#[derive(Debug, Clone)]
pub struct StaticMap<K, V> {
    entries: Box<[(K, V)]>,
}

impl<K: Ord + Debug, V> StaticMap<K, V> {
    pub fn new(entries: impl Into<Vec<(K, V)>>) -> Result<Self, TableError> {
        let mut entries = entries.into();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(TableError::DuplicateKey(format!("{:?}", pair[0].0)));
        }

        Ok(Self {
            entries: entries.into_boxed_slice(),
        })
    }
}

impl<K: Ord, V> StaticMap<K, V> {
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries
            .binary_search_by(|(k, _)| k.borrow().cmp(key))
            .ok()
            .map(|i| &self.entries[i].1)
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// ContigMap - dense keys, O(1) offset lookup
// =============================================================================

/// Keys usable in a [`ContigMap`]: anything with a stable integer position.
pub trait ContigKey: Copy {
    fn to_index(self) -> usize;
}

macro_rules! contig_key_int {
    ($($t:ty),*) => {
        $(impl ContigKey for $t {
            fn to_index(self) -> usize {
                self as usize
            }
        })*
    };
}

contig_key_int!(u8, u16, u32, usize);

/// Read-only table whose keys form an unbroken integer range.
///
/// Construction rejects any gap or reordering; lookups are a subtraction and
/// an index, which is what the opcode metadata path relies on.
#[derive(Debug, Clone)]
pub struct ContigMap<K, V> {
    first: usize,
    entries: Box<[(K, V)]>,
}

impl<K: ContigKey, V> ContigMap<K, V> {
    pub fn new(entries: impl Into<Vec<(K, V)>>) -> Result<Self, TableError> {
        let entries = entries.into();
        let first = entries.first().ok_or(TableError::Empty)?.0.to_index();

        for (offset, (key, _)) in entries.iter().enumerate() {
            let expected = first + offset;
            let found = key.to_index();
            if found != expected {
                return Err(TableError::NotContiguous { expected, found });
            }
        }

        Ok(Self {
            first,
            entries: entries.into_boxed_slice(),
        })
    }

    pub fn get(&self, key: K) -> Option<&V> {
        key.to_index()
            .checked_sub(self.first)
            .and_then(|i| self.entries.get(i))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inclusive key range covered by the table.
    pub fn key_range(&self) -> (usize, usize) {
        (self.first, self.first + self.entries.len() - 1)
    }
}
