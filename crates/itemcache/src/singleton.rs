//! Lazily created single instance with an explicit owner

use std::sync::Arc;

use itemstore::Result;

use crate::cache::{clone_refused, IdentityCache};

/// Holds at most one instance of `T`, created on first use
///
/// Unlike a global, the `Singleton` itself is an ordinary value: create it
/// during start-up and hand references to whoever needs the instance.
pub struct Singleton<T> {
    cell: IdentityCache<(), T>,
}

impl<T> Singleton<T> {
    /// Create an empty holder; `init` runs on the first successful `instance()`
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            cell: IdentityCache::new(move |_: &()| init()),
        }
    }

    /// The instance, created on first call
    ///
    /// A failed `init` is not remembered; the next call tries again.
    pub fn instance(&self) -> Result<Arc<T>> {
        self.cell.get(&())
    }

    /// Whether the instance exists yet
    pub fn is_initialized(&self) -> bool {
        self.cell.contains(&())
    }

    /// Always fails with `IllegalOperation`
    pub fn duplicate(&self) -> Result<Self> {
        Err(clone_refused("Singleton"))
    }
}
