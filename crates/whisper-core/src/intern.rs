//! Per-thread string interning.
//!
//! Identifiers — property names, parameter names, `@NodeType` handler keys
//! — are looked up constantly and compared far more often than they are
//! created, so every identifier is interned once into a [`StringId`] and
//! compared by that id afterward rather than by its bytes.

use ahash::AHashMap;

/// An interned identifier. Cheap to copy, compares in O(1), carries no
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(u32);

/// Owns the canonical string for every [`StringId`] handed out. One
/// `Interner` lives per [`crate::runtime::ThreadContext`]; ids from
/// different interners must never be mixed.
#[derive(Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    by_text: AHashMap<Box<str>, StringId>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.by_text.get(s) {
            return *id;
        }
        let id = StringId(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.by_text.insert(boxed, id);
        id
    }

    pub fn resolve(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_text_returns_the_same_id() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_text_gets_distinct_ids() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "foo");
        assert_eq!(interner.resolve(b), "bar");
    }
}
