//! UTF-8 identifier canonicalization and interned `String` objects.
//!
//! Grounded on `ahash::AHashMap` usage in `exo-jvm/src/vm/object.rs`
//! (`JavaClassInstance::fields`) for the hash-map choice; the
//! canonicalize-by-content-then-compare-by-pointer pooling idea itself has
//! no teacher counterpart (the teacher interns nothing) and is implemented
//! fresh from the property it must satisfy: pooled values are pointer-equal
//! iff byte-equal.

use ahash::AHashMap;

use crate::object::Reference;

/// Canonical storage for every identifier/signature/string-literal the class
/// loader sees. `get(bytes, true)` is the only way to obtain a canonical
/// pointer, so two equal byte strings always resolve to the same `Rc`.
#[derive(Default)]
pub struct UtfPool {
    entries: AHashMap<Vec<u8>, std::rc::Rc<[u8]>>,
}

impl UtfPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize `bytes`. When `add` is false and the key is unknown,
    /// returns `None` instead of inserting it.
    pub fn get(&mut self, bytes: &[u8], add: bool) -> Option<std::rc::Rc<[u8]>> {
        if let Some(existing) = self.entries.get(bytes) {
            return Some(existing.clone());
        }
        if !add {
            return None;
        }
        let rc: std::rc::Rc<[u8]> = bytes.into();
        self.entries.insert(bytes.to_vec(), rc.clone());
        Some(rc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &std::rc::Rc<[u8]>> {
        self.entries.values()
    }
}

/// Interned `java.lang.String` instances, keyed by modified-UTF-8 content.
/// Values are heap references into the object model, set once a `String`
/// instance has actually been allocated for that content.
#[derive(Default)]
pub struct InternPool {
    entries: AHashMap<Vec<u8>, Reference>,
}

impl InternPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, content: &[u8]) -> Option<Reference> {
        self.entries.get(content).copied()
    }

    /// Record `r` as the canonical interned `String` for `content`. Callers
    /// are expected to have already checked `lookup` and allocated a fresh
    /// `String` only on a miss.
    pub fn intern(&mut self, content: Vec<u8>, r: Reference) {
        self.entries.insert(content, r);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.entries.values()
    }

    /// Content alongside its interned reference, for the rare caller (the
    /// `PrintStream` native shim) that needs to go from a `String` object
    /// back to the bytes it was interned from.
    pub fn iter_entries(&self) -> impl Iterator<Item = (&Vec<u8>, &Reference)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_utf_is_pointer_equal_iff_byte_equal() {
        let mut pool = UtfPool::new();
        let a = pool.get(b"java/lang/Object", true).unwrap();
        let b = pool.get(b"java/lang/Object", true).unwrap();
        assert!(std::rc::Rc::ptr_eq(&a, &b));
        let c = pool.get(b"java/lang/String", true).unwrap();
        assert!(!std::rc::Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn miss_without_add_returns_none() {
        let mut pool = UtfPool::new();
        assert!(pool.get(b"unseen", false).is_none());
    }
}
