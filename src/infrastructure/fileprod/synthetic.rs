//! Producer for strings synthesized at startup, e.g. `/static/version.js`.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ProduceError, Producer};

/// Statically registered path → content pairs.
#[derive(Debug, Default)]
pub struct SyntheticProducer {
    entries: HashMap<String, String>,
}

impl SyntheticProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &str, content: String) {
        self.entries.insert(path.to_string(), content);
    }
}

#[async_trait]
impl Producer for SyntheticProducer {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn produce(&self, path: &str) -> Result<Option<Bytes>, ProduceError> {
        Ok(self
            .entries
            .get(path)
            .map(|content| Bytes::from(content.clone())))
    }
}

/// Escape a string for embedding in a JavaScript double-quoted literal.
pub fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
