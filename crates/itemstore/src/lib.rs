//! # itemstore
//!
//! Item records and the backing sources an identity cache loads them from.
//!
//! ## Sources
//! - **FixedWidthFile**: header line, 10-column id, name
//! - **TsvFile**: `code`, `name`, `price` separated by tabs
//! - **MemorySource**: in-memory test double
//! - **MockSource**: dummy item for every key

#![warn(missing_docs)]

mod error;
mod item;
pub mod parser;
mod source;

pub use error::{Error, Result};
pub use item::Item;
pub use source::{DataSource, FixedWidthFile, MemorySource, MockSource, TsvFile, DUMMY_ITEM_NAME};
