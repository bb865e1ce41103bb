//! Named mutual exclusion for filesystem-backed files.
//!
//! Any operation that creates, writes, or deletes a temporary or cache-backing
//! file must hold a blocking lock keyed by that file's context string for the
//! duration of the mutation, so two concurrent requests for the same path and
//! filter can't corrupt partial writes or race a delete against a read.
//!
//! The manager is an explicit instance constructed once at process start and
//! passed by reference to whatever needs locking — no global state. [`reset`]
//! clears all held keys, which tests use to avoid cross-test lock leakage.
//!
//! Locks release on guard drop, so release is guaranteed on every exit path
//! including panics inside a [`with_lock`] body.
//!
//! [`reset`]: LockManager::reset
//! [`with_lock`]: LockManager::with_lock

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Something that can key a lock.
///
/// Contexts with a natural string form (paths, names) contend on that string.
/// For everything else, [`IdentityContext`] keys on object identity — which
/// means two distinct instances representing the same logical resource never
/// contend with each other. That asymmetry is intentional and matches how
/// temporary files behave: each `TempFile` instance guards only its own
/// acquisition.
pub trait LockContext {
    fn lock_key(&self) -> String;
}

impl LockContext for str {
    fn lock_key(&self) -> String {
        self.to_string()
    }
}

impl LockContext for String {
    fn lock_key(&self) -> String {
        self.clone()
    }
}

impl LockContext for Path {
    fn lock_key(&self) -> String {
        self.to_string_lossy().into_owned()
    }
}

impl LockContext for PathBuf {
    fn lock_key(&self) -> String {
        self.as_path().lock_key()
    }
}

impl<T: LockContext + ?Sized> LockContext for &T {
    fn lock_key(&self) -> String {
        (**self).lock_key()
    }
}

/// Keys a lock on the address of a value rather than its content.
pub struct IdentityContext<'a, T>(pub &'a T);

impl<T> LockContext for IdentityContext<'_, T> {
    fn lock_key(&self) -> String {
        format!("identity:{:p}", self.0 as *const T)
    }
}

/// Process-wide registry of held lock keys.
#[derive(Default)]
pub struct LockManager {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Proof of a held lock. Releases on drop.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    key: String,
}

impl LockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.held.lock().remove(&self.key);
        self.manager.released.notify_all();
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock without waiting. `None` if it's held elsewhere.
    pub fn acquire(&self, context: impl LockContext) -> Option<LockGuard<'_>> {
        let key = context.lock_key();
        let mut held = self.held.lock();
        if held.contains(&key) {
            return None;
        }
        held.insert(key.clone());
        Some(LockGuard { manager: self, key })
    }

    /// Take the lock, waiting until the current holder releases.
    pub fn blocking(&self, context: impl LockContext) -> LockGuard<'_> {
        let key = context.lock_key();
        let mut held = self.held.lock();
        while held.contains(&key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());
        LockGuard { manager: self, key }
    }

    /// Run `body` while holding a blocking lock on `context`.
    pub fn with_lock<T>(&self, context: impl LockContext, body: impl FnOnce() -> T) -> T {
        let _guard = self.blocking(context);
        body()
    }

    /// Forget all held keys. Test isolation only — outstanding guards will
    /// still "release" their (now absent) key harmlessly on drop.
    pub fn reset(&self) {
        self.held.lock().clear();
        self.released.notify_all();
    }
}
