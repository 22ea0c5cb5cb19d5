//! Identifier interning and the process-wide identifier pool.
//!
//! Identifiers are compared constantly — during lexing (keyword lookup),
//! name resolution and symbol-table probes. By storing each unique string
//! exactly once and comparing integer [`Ident`] handles, equality is O(1)
//! regardless of string length.
//!
//! ## The pool
//!
//! The lexer interns through the process-wide [`IdentifierPool`], an
//! insert-only [`Interner`] guarded by a single lock. A caller takes a
//! [`PoolLock`] for the duration of a line of tokenisation and releases it
//! afterwards. Because the pool is insert-only, an `Ident` minted by any
//! compilation stays valid for the lifetime of the process.
//!
//! ## Example
//!
//! ```
//! use upp_base::identifier_pool;
//!
//! let mut pool = identifier_pool().lock();
//! let a = pool.intern("main");
//! let b = pool.intern("main");
//! assert_eq!(a, b);
//! assert_eq!(pool.resolve(a), "main");
//! ```

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A lightweight handle to an interned identifier.
///
/// Idents are `Copy` and compare in O(1) time. Use [`PoolLock::resolve`]
/// (or [`IdentifierPool::resolve_owned`]) to retrieve the original string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Ident(u32);

impl Ident {
    /// The empty identifier, always at index 0.
    pub const EMPTY: Ident = Ident(0);

    /// Returns the internal index of this ident, useful for dense storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for Ident {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A string interner handing out [`Ident`] handles.
///
/// Each unique string is stored exactly once; interning the same string
/// twice returns the same handle.
pub struct Interner {
    map: HashMap<String, Ident>,
    vec: Vec<String>,
}

impl Interner {
    /// Creates an interner with only the empty string pre-interned.
    pub fn new() -> Self {
        let mut interner = Interner {
            map: HashMap::new(),
            vec: Vec::new(),
        };
        interner.vec.push(String::new());
        interner
    }

    /// Interns a string, returning its handle.
    pub fn intern(&mut self, s: &str) -> Ident {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = Ident(self.vec.len() as u32);
        self.vec.push(s.to_string());
        self.map.insert(s.to_string(), id);
        id
    }

    /// Returns the string for the given handle.
    ///
    /// # Panics
    ///
    /// Panics if `ident` was not created by this interner.
    pub fn resolve(&self, ident: Ident) -> &str {
        &self.vec[ident.0 as usize]
    }

    /// Looks up an existing interned string without creating a new entry.
    pub fn lookup(&self, s: &str) -> Option<Ident> {
        self.map.get(s).copied()
    }

    /// Returns the number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Returns `true` if only the empty string is present.
    pub fn is_empty(&self) -> bool {
        self.vec.len() <= 1
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide identifier pool: an insert-only [`Interner`] behind a
/// single lock.
pub struct IdentifierPool {
    inner: Mutex<Interner>,
}

impl IdentifierPool {
    fn new() -> Self {
        IdentifierPool {
            inner: Mutex::new(Interner::new()),
        }
    }

    /// Acquires the pool lock.
    ///
    /// Hold the lock for a bounded region (one line of tokenisation, one
    /// batch of lookups) — it is shared by every compilation in the
    /// process.
    pub fn lock(&self) -> PoolLock<'_> {
        PoolLock {
            guard: self.inner.lock().expect("identifier pool poisoned"),
        }
    }

    /// Interns a single string, taking and releasing the lock internally.
    pub fn intern(&self, s: &str) -> Ident {
        self.lock().intern(s)
    }

    /// Resolves a handle to an owned string, taking and releasing the lock
    /// internally. Convenient for error-message formatting.
    pub fn resolve_owned(&self, ident: Ident) -> String {
        self.lock().resolve(ident).to_string()
    }
}

/// An acquired lock on the identifier pool.
pub struct PoolLock<'a> {
    guard: MutexGuard<'a, Interner>,
}

impl PoolLock<'_> {
    /// Interns a string, returning its handle.
    pub fn intern(&mut self, s: &str) -> Ident {
        self.guard.intern(s)
    }

    /// Returns the string for the given handle.
    pub fn resolve(&self, ident: Ident) -> &str {
        self.guard.resolve(ident)
    }

    /// Looks up an existing interned string without inserting.
    pub fn lookup(&self, s: &str) -> Option<Ident> {
        self.guard.lookup(s)
    }
}

static POOL: Lazy<IdentifierPool> = Lazy::new(IdentifierPool::new);

/// Returns the process-wide identifier pool.
pub fn identifier_pool() -> &'static IdentifierPool {
    &POOL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_same_ident_for_same_string() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn intern_returns_different_idents_for_different_strings() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("world");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_returns_original_string() {
        let mut interner = Interner::new();
        let id = interner.intern("main");
        assert_eq!(interner.resolve(id), "main");
    }

    #[test]
    fn empty_ident_resolves_to_empty_string() {
        let interner = Interner::new();
        assert_eq!(interner.resolve(Ident::EMPTY), "");
    }

    #[test]
    fn lookup_does_not_insert() {
        let mut interner = Interner::new();
        assert_eq!(interner.lookup("absent"), None);
        let len = interner.len();
        interner.intern("present");
        assert_eq!(interner.len(), len + 1);
        assert!(interner.lookup("present").is_some());
    }

    #[test]
    fn pool_idents_are_stable_across_locks() {
        let pool = identifier_pool();
        let a = pool.intern("stable_across_locks");
        let b = pool.intern("stable_across_locks");
        assert_eq!(a, b);
        assert_eq!(pool.resolve_owned(a), "stable_across_locks");
    }

    #[test]
    fn pool_lock_batches_interning() {
        let pool = identifier_pool();
        let mut lock = pool.lock();
        let a = lock.intern("batch_a");
        let b = lock.intern("batch_b");
        assert_ne!(a, b);
        assert_eq!(lock.resolve(a), "batch_a");
    }
}
