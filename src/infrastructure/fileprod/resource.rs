//! Producer for resources embedded in the server binary.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ProduceError, Producer};

/// Byte blobs compiled into (or registered on) the binary itself, looked up
/// after the filesystem declines a path.
#[derive(Debug, Default)]
pub struct ResourceProducer {
    entries: HashMap<String, Bytes>,
}

impl ResourceProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &str, bytes: impl Into<Bytes>) {
        self.entries.insert(path.to_string(), bytes.into());
    }
}

#[async_trait]
impl Producer for ResourceProducer {
    fn name(&self) -> &'static str {
        "resource"
    }

    async fn produce(&self, path: &str) -> Result<Option<Bytes>, ProduceError> {
        Ok(self.entries.get(path).cloned())
    }
}
