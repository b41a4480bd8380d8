//! Item record shared by every backing source

use serde::Serialize;

/// A catalogue item as read from a backing source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    code: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<u32>,
}

impl Item {
    /// Create an item without a price
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            price: None,
        }
    }

    /// Create an item with a price
    pub fn with_price(code: impl Into<String>, name: impl Into<String>, price: u32) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            price: Some(price),
        }
    }

    /// Item code (lookup key)
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit price, if the source carries one
    pub fn price(&self) -> Option<u32> {
        self.price
    }
}
