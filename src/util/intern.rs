use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::RandomState;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Handle to an interned string.
///
/// Two symbols from the same pool are equal exactly when their text is equal,
/// so comparing names is an integer compare after the first lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Append-only deduplicating string store.
///
/// Symbols are handed out in order of first insertion and stay valid for the
/// life of the pool; there is no removal.
#[derive(Debug, Default, Clone)]
pub struct StringPool {
    strings: IndexSet<Arc<str>, RandomState>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(index) = self.strings.get_index_of(text) {
            return Symbol(index as u32);
        }
        let (index, _) = self.strings.insert_full(Arc::from(text));
        Symbol(index as u32)
    }

    /// Like [`intern`](Self::intern) but reuses the allocation on first
    /// occurrence.
    pub fn intern_owned(&mut self, text: String) -> Symbol {
        if let Some(index) = self.strings.get_index_of(text.as_str()) {
            return Symbol(index as u32);
        }
        let (index, _) = self.strings.insert_full(Arc::from(text));
        Symbol(index as u32)
    }

    pub fn lookup(&self, text: &str) -> Option<Symbol> {
        self.strings.get_index_of(text).map(|i| Symbol(i as u32))
    }

    /// Text of a symbol.
    ///
    /// # Panics
    ///
    /// If `symbol` was issued by a different pool and is out of range here.
    pub fn resolve(&self, symbol: Symbol) -> &str {
        &self.strings[symbol.index()]
    }

    pub fn get(&self, symbol: Symbol) -> Option<&str> {
        self.strings.get_index(symbol.index()).map(|s| &**s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (Symbol(i as u32), &**s))
    }
}

/// Process-wide pool with synchronised insertion.
///
/// Cloning shares the same underlying pool.
#[derive(Debug, Default, Clone)]
pub struct SharedStringPool {
    inner: Arc<Mutex<StringPool>>,
}

impl SharedStringPool {
    pub fn new() -> Self {
        Self::default()
    }

    // The pool is append-only, so a panic mid-insert leaves it consistent
    // and a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, StringPool> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn intern(&self, text: &str) -> Symbol {
        self.lock().intern(text)
    }

    pub fn lookup(&self, text: &str) -> Option<Symbol> {
        self.lock().lookup(text)
    }

    pub fn resolve(&self, symbol: Symbol) -> Option<Arc<str>> {
        let pool = self.lock();
        pool.strings.get_index(symbol.index()).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` with exclusive access, for batches of insertions.
    pub fn with<R>(&self, f: impl FnOnce(&mut StringPool) -> R) -> R {
        f(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn test_equal_content_equal_symbol() {
        let mut pool = StringPool::new();
        let a = pool.intern("totale");
        let owned = String::from("tot") + "ale";
        let b = pool.intern(&owned);
        let c = pool.intern_owned(owned.clone());
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_distinct_content_distinct_symbol() {
        let mut pool = StringPool::new();
        let a = pool.intern("imponibile");
        let b = pool.intern("iva");
        assert_ne!(a, b);
        assert_eq!(pool.resolve(a), "imponibile");
        assert_eq!(pool.resolve(b), "iva");
    }

    #[test]
    fn test_grows_only_on_first_occurrence() {
        let mut pool = StringPool::new();
        let words = ["a", "b", "a", "c", "b", "a", ""];
        let mut seen = Vec::new();
        for word in words {
            let before = pool.len();
            pool.intern(word);
            let expected = if seen.contains(&word) {
                before
            } else {
                seen.push(word);
                before + 1
            };
            assert_eq!(pool.len(), expected);
        }
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_lookup_does_not_insert() {
        let mut pool = StringPool::new();
        assert_eq!(pool.lookup("missing"), None);
        assert!(pool.is_empty());
        let sym = pool.intern("present");
        assert_eq!(pool.lookup("present"), Some(sym));
    }

    #[test]
    fn test_iter_in_insertion_order() {
        let mut pool = StringPool::new();
        pool.intern("z");
        pool.intern("a");
        pool.intern("z");
        let texts: Vec<_> = pool.iter().map(|(_, s)| s).collect();
        assert_eq!(texts, vec!["z", "a"]);
    }

    #[test]
    fn test_get_out_of_range() {
        let pool = StringPool::new();
        assert_eq!(pool.get(Symbol(3)), None);
    }

    #[test]
    fn test_shared_pool_across_threads() {
        let pool = SharedStringPool::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    ["fattura", "data", "numero", "fattura"]
                        .iter()
                        .map(|s| pool.intern(s))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for symbols in &results {
            assert_eq!(symbols, &results[0]);
            assert_eq!(symbols[0], symbols[3]);
        }
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.resolve(results[0][1]).as_deref(), Some("data"));
    }

    #[test]
    fn test_shared_pool_batch() {
        let pool = SharedStringPool::new();
        let (a, b) = pool.with(|p| (p.intern("x"), p.intern("y")));
        assert_ne!(a, b);
        assert_eq!(pool.lookup("y"), Some(b));
    }
}
