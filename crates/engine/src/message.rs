//! Message types for the mock engine
//!
//! This module defines the message format used by the mock engine,
//! matching the production engine's message structure.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message that flows through the mock engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    /// Headers for metadata
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Create a message from its headers
    pub fn with_headers(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }

    /// Add a header to the message
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Get a header value
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}
