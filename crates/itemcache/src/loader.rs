//! Loaders: how a cache produces the value for a missing key

use std::fmt;

use itemstore::{DataSource, Error, Item, Result};

/// Produces the value for a key the cache does not hold yet
///
/// Any `Fn(&K) -> Result<V>` closure is a loader.
pub trait Loader<K, V>: Send + Sync {
    /// Build the value for `key`, or fail with `Error::NotFound`
    fn load(&self, key: &K) -> Result<V>;
}

impl<K, V, F> Loader<K, V> for F
where
    F: Fn(&K) -> Result<V> + Send + Sync,
{
    fn load(&self, key: &K) -> Result<V> {
        self(key)
    }
}

/// Loads items through a [`DataSource`]
#[derive(Debug)]
pub struct SourceLoader<S> {
    source: S,
}

impl<S: DataSource> SourceLoader<S> {
    /// Wrap `source`
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The wrapped source
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: DataSource> Loader<String, Item> for SourceLoader<S> {
    fn load(&self, key: &String) -> Result<Item> {
        self.source.find(key)
    }
}

/// Loader of a pre-built pool: nothing outside the seed exists
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolMiss;

impl<K: fmt::Display, V> Loader<K, V> for PoolMiss {
    fn load(&self, key: &K) -> Result<V> {
        Err(Error::not_found(key))
    }
}
