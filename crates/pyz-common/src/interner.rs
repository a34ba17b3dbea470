//! String interning.
//!
//! Identifiers, member names, and literal strings are deduplicated into
//! `Atom`s so that comparisons are integer comparisons. A single
//! `StringInterner` is shared (via `Arc`) between the parse-tree arena and
//! the type interner so that atoms from both unify.

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// An interned string handle. Cheap to copy and compare.
///
/// Atoms are only meaningful relative to the `StringInterner` that produced
/// them; two interners assign atoms independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

#[derive(Default)]
struct InternerInner {
    map: FxHashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

/// A thread-safe string interner.
///
/// Interning the same string twice returns the same `Atom`. Resolution
/// returns a shared `Arc<str>` so callers can hold the text without keeping
/// the interner locked.
#[derive(Default)]
pub struct StringInterner {
    inner: Mutex<InternerInner>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its atom.
    pub fn intern(&self, text: &str) -> Atom {
        let mut inner = self.inner.lock().expect("string interner poisoned");
        if let Some(&id) = inner.map.get(text) {
            return Atom(id);
        }
        let id = inner.strings.len() as u32;
        let arc: Arc<str> = Arc::from(text);
        inner.strings.push(arc.clone());
        inner.map.insert(arc, id);
        Atom(id)
    }

    /// Resolve an atom back to its text.
    ///
    /// Returns `None` for atoms produced by a different interner.
    pub fn try_resolve(&self, atom: Atom) -> Option<Arc<str>> {
        let inner = self.inner.lock().expect("string interner poisoned");
        inner.strings.get(atom.0 as usize).cloned()
    }

    /// Resolve an atom back to its text, or `"<unknown>"` if the atom is
    /// foreign to this interner.
    pub fn resolve(&self, atom: Atom) -> Arc<str> {
        self.try_resolve(atom)
            .unwrap_or_else(|| Arc::from("<unknown>"))
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("string interner poisoned");
        inner.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
