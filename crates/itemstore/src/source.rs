//! Backing sources that resolve an item code to a record
//!
//! Sources are deterministic and side-effect free as far as callers can
//! observe: the same key always yields an equal record or `NotFound`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::item::Item;
use crate::parser::{parse_fixed_width, parse_tsv};

/// Name given to every item produced by [`MockSource`] by default
pub const DUMMY_ITEM_NAME: &str = "dummy item";

/// Resolves keys to raw item records
pub trait DataSource: Send + Sync {
    /// Find the record for `key`, or `Error::NotFound`
    fn find(&self, key: &str) -> Result<Item>;

    /// Every record in the source, in source order
    fn scan(&self) -> Result<Vec<Item>>;
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn find(&self, key: &str) -> Result<Item> {
        (**self).find(key)
    }

    fn scan(&self) -> Result<Vec<Item>> {
        (**self).scan()
    }
}

impl<S: DataSource + ?Sized> DataSource for Arc<S> {
    fn find(&self, key: &str) -> Result<Item> {
        (**self).find(key)
    }

    fn scan(&self) -> Result<Vec<Item>> {
        (**self).scan()
    }
}

/// Attach file and line context to a parse failure
fn at_line(path: &Path, line_no: usize, err: Error) -> Error {
    match err {
        Error::Parse(msg) => Error::Parse(format!("{}:{}: {}", path.display(), line_no, msg)),
        other => other,
    }
}

/// Fixed-width file: a header line, then a 10-column id followed by the name
///
/// The file is read again on every lookup.
#[derive(Debug, Clone)]
pub struct FixedWidthFile {
    path: PathBuf,
}

impl FixedWidthFile {
    /// Source backed by the file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn keys_match(key: &str, id: &str) -> bool {
        if key == id {
            return true;
        }
        match (key.parse::<u64>(), id.parse::<u64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Visit records until `visit` returns `Some`
    fn walk<T>(&self, mut visit: impl FnMut(&str, &str) -> Option<T>) -> Result<Option<T>> {
        let contents = fs::read_to_string(&self.path)?;

        // Line 1 is the column header
        for (idx, line) in contents.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let (id, name) = parse_fixed_width(line).map_err(|e| at_line(&self.path, idx + 1, e))?;
            if let Some(found) = visit(id, name) {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}

impl DataSource for FixedWidthFile {
    fn find(&self, key: &str) -> Result<Item> {
        let key = key.trim();
        self.walk(|id, name| Self::keys_match(key, id).then(|| Item::new(id, name)))?
            .ok_or_else(|| Error::not_found(key))
    }

    fn scan(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        self.walk(|id, name| {
            items.push(Item::new(id, name));
            None::<()>
        })?;
        Ok(items)
    }
}

/// Tab-separated file of `code`, `name`, `price`
#[derive(Debug, Clone)]
pub struct TsvFile {
    path: PathBuf,
}

impl TsvFile {
    /// Source backed by the file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for TsvFile {
    fn find(&self, key: &str) -> Result<Item> {
        self.scan()?
            .into_iter()
            .find(|item| item.code() == key)
            .ok_or_else(|| Error::not_found(key))
    }

    fn scan(&self) -> Result<Vec<Item>> {
        let contents = fs::read_to_string(&self.path)?;
        let mut items = Vec::new();

        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (code, name, price) = parse_tsv(line).map_err(|e| at_line(&self.path, idx + 1, e))?;
            items.push(Item::with_price(code, name, price));
        }

        Ok(items)
    }
}

/// In-memory source, mostly for tests
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    items: BTreeMap<String, Item>,
}

impl MemorySource {
    /// Empty source; every lookup is `NotFound`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the source has no records
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Item> for MemorySource {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|item| (item.code().to_string(), item))
                .collect(),
        }
    }
}

impl DataSource for MemorySource {
    fn find(&self, key: &str) -> Result<Item> {
        self.items.get(key).cloned().ok_or_else(|| Error::not_found(key))
    }

    fn scan(&self) -> Result<Vec<Item>> {
        Ok(self.items.values().cloned().collect())
    }
}

/// Answers every key with a dummy item and never touches storage
#[derive(Debug, Clone)]
pub struct MockSource {
    name: String,
}

impl MockSource {
    /// Mock naming its items [`DUMMY_ITEM_NAME`]
    pub fn new() -> Self {
        Self::named(DUMMY_ITEM_NAME)
    }

    /// Mock naming its items `name`
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for MockSource {
    fn find(&self, key: &str) -> Result<Item> {
        Ok(Item::new(key, self.name.as_str()))
    }

    fn scan(&self) -> Result<Vec<Item>> {
        Ok(Vec::new())
    }
}
