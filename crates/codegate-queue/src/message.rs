//! Message envelope types shared by all transports.

use std::collections::BTreeMap;
use std::fmt;

/// Application properties carried next to a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    /// Content type of the body (e.g. "application/json")
    pub content_type: Option<String>,
    pub application: BTreeMap<String, String>,
}

impl MessageProperties {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            application: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.application.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.application.get(key).map(String::as_str)
    }

    /// Integer property; `None` when absent or not a number.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

/// Opaque handle identifying one locked delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(pub String);

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A received, locked message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
    pub lock_token: LockToken,
}
