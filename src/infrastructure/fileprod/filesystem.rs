//! Filesystem producer rooted at the configured webroot.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;

use super::{ProduceError, Producer};

/// Serves files below a webroot. Only paths matching one of the whitelist
/// patterns are looked up at all; everything else passes through to the next
/// producer.
#[derive(Debug)]
pub struct FileSystemProducer {
    webroot: PathBuf,
    whitelist: Vec<Regex>,
}

impl FileSystemProducer {
    pub fn new(webroot: PathBuf) -> Self {
        Self {
            webroot,
            whitelist: Vec::new(),
        }
    }

    /// Allow paths matching the whole-path pattern through to the disk.
    pub fn whitelist(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.whitelist.push(Regex::new(&format!("^(?:{pattern})$"))?);
        Ok(())
    }

    fn is_whitelisted(&self, path: &str) -> bool {
        self.whitelist.iter().any(|regex| regex.is_match(path))
    }
}

#[async_trait]
impl Producer for FileSystemProducer {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn produce(&self, path: &str) -> Result<Option<Bytes>, ProduceError> {
        if !self.is_whitelisted(path) {
            return Ok(None);
        }
        // The URL path is rooted; never let it climb out of the webroot.
        if path.split('/').any(|segment| segment == "..") {
            return Ok(None);
        }
        let full = self.webroot.join(path.trim_start_matches('/'));
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                Ok(None)
            }
            Err(source) => Err(ProduceError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}
