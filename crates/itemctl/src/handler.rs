//! Command handler for itemctl

use std::io::Write;

use anyhow::{Context, Result};
use itemcache::{IdentityCache, Lookup};
use itemstore::{Error, Item};
use serde_json::json;
use tracing::{info, warn};

pub struct CommandHandler {
    cache: IdentityCache<String, Item>,
    json: bool,
}

impl CommandHandler {
    pub fn new(cache: IdentityCache<String, Item>, json: bool) -> Self {
        Self { cache, json }
    }

    /// Look up `keys` in order. Returns false if any key had no record.
    pub fn handle_get<W: Write>(&self, keys: &[String], out: &mut W) -> Result<bool> {
        let mut all_found = true;

        for key in keys {
            match self.cache.lookup(key) {
                Ok(lookup) => self.write_item(key, &lookup, out)?,
                Err(Error::NotFound(_)) => {
                    warn!("No item for key {}", key);
                    all_found = false;
                    self.write_missing(key, out)?;
                }
                Err(e) => return Err(e).with_context(|| format!("looking up {}", key)),
            }
        }

        let stats = self.cache.stats();
        info!(
            hits = stats.hits(),
            misses = stats.misses(),
            creations = stats.creations(),
            failures = stats.failures(),
            "Cache statistics"
        );

        Ok(all_found)
    }

    /// Report whether both keys resolve to one instance
    pub fn handle_same<W: Write>(&self, first: &str, second: &str, out: &mut W) -> Result<bool> {
        let a = self
            .cache
            .get(&first.to_string())
            .with_context(|| format!("looking up {}", first))?;
        let b = self
            .cache
            .get(&second.to_string())
            .with_context(|| format!("looking up {}", second))?;
        let same = std::sync::Arc::ptr_eq(&a, &b);

        if self.json {
            writeln!(out, "{}", json!({ "first": first, "second": second, "same": same }))?;
        } else if same {
            writeln!(out, "{} and {} are the same instance", first, second)?;
        } else {
            writeln!(out, "{} and {} are different instances", first, second)?;
        }

        Ok(same)
    }

    fn write_item<W: Write>(&self, key: &str, lookup: &Lookup<Item>, out: &mut W) -> Result<()> {
        let served = if lookup.is_created() { "created" } else { "cached" };

        if self.json {
            let item: &Item = lookup;
            writeln!(out, "{}", json!({ "key": key, "served": served, "item": item }))?;
        } else {
            let price = lookup
                .price()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(out, "{}\t{}\t{}\t{}", lookup.code(), lookup.name(), price, served)?;
        }

        Ok(())
    }

    fn write_missing<W: Write>(&self, key: &str, out: &mut W) -> Result<()> {
        if self.json {
            writeln!(out, "{}", json!({ "key": key, "error": "not found" }))?;
        } else {
            writeln!(out, "{}\tnot found", key)?;
        }
        Ok(())
    }
}
