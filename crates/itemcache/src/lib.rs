//! # itemcache
//!
//! Identity-stable object cache: repeated lookups of a key return the very
//! same shared instance, and the instance is created at most once.
//!
//! ## Architecture
//! - **IdentityCache**: AHash map of per-key slots behind a `parking_lot` lock
//! - **Loader**: builds missing values (closure, `DataSource`, or a fixed pool)
//! - **Singleton**: one lazily created instance with an explicit owner
//!
//! ```
//! use std::sync::Arc;
//! use itemcache::IdentityCache;
//! use itemstore::{Item, MemorySource};
//!
//! let source: MemorySource = vec![Item::with_price("ABC0001", "Pencil", 120)]
//!     .into_iter()
//!     .collect();
//! let cache = IdentityCache::from_source(source);
//!
//! let a = cache.get(&"ABC0001".to_string()).unwrap();
//! let b = cache.get(&"ABC0001".to_string()).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! assert!(cache.get(&"ABC0002".to_string()).is_err());
//! ```

#![warn(missing_docs)]

mod cache;
mod loader;
mod singleton;
mod stats;

pub use cache::{IdentityCache, Lookup};
pub use loader::{Loader, PoolMiss, SourceLoader};
pub use singleton::Singleton;
pub use stats::CacheStats;
