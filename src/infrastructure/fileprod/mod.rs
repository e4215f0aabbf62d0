//! File producer pipeline: resolves a URL path to a cached byte blob.
//!
//! A request path is first rewritten through the alias map, then offered to
//! each producer in registration order; the first producer to return bytes
//! wins. Results are cached per resolved path with a configurable max age,
//! and production is single-flight per path.

pub mod alias;
pub mod cache;
pub mod content_type;
pub mod filesystem;
pub mod resource;
pub mod synthetic;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::common::time::now_millis;

pub use alias::AliasMap;
pub use cache::{Blob, BlobCache, CachedBlob};
pub use content_type::ContentTypeMap;
pub use filesystem::FileSystemProducer;
pub use resource::ResourceProducer;
pub use synthetic::SyntheticProducer;

/// Content type used when no mapping rule matches.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors surfaced by the producer pipeline. The request pipeline converts
/// them to a 500 for the affected request only.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("alias expansion did not reach a fixed point for {0:?}")]
    AliasCycle(String),

    #[error("i/o error reading {path:?}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// A source of bytes for a URL path.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `Ok(None)` declines the path; the next producer is asked.
    async fn produce(&self, path: &str) -> Result<Option<Bytes>, ProduceError>;
}

/// The ordered producer chain with its alias map, content-type map and cache.
/// Assembled at startup and immutable afterwards.
pub struct ProducerChain {
    aliases: AliasMap,
    content_types: ContentTypeMap,
    producers: Vec<Arc<dyn Producer>>,
    cache: BlobCache,
}

impl ProducerChain {
    pub fn new(max_age: Duration) -> Self {
        Self {
            aliases: AliasMap::new(),
            content_types: ContentTypeMap::new(),
            producers: Vec::new(),
            cache: BlobCache::new(max_age),
        }
    }

    pub fn aliases_mut(&mut self) -> &mut AliasMap {
        &mut self.aliases
    }

    pub fn content_types_mut(&mut self) -> &mut ContentTypeMap {
        &mut self.content_types
    }

    pub fn push_producer(&mut self, producer: Arc<dyn Producer>) {
        self.producers.push(producer);
    }

    /// Expand the alias map without producing.
    pub fn resolve_alias(&self, path: &str) -> Result<String, ProduceError> {
        self.aliases.resolve(path)
    }

    /// Resolve a path to a blob, or `None` when every producer declines.
    pub async fn get(&self, path: &str) -> Result<Option<Blob>, ProduceError> {
        let resolved = self.aliases.resolve(path)?;
        let slot = self.cache.slot(&resolved).await;
        let mut guard = slot.lock().await;

        let now = now_millis();
        if let Some(blob) = &guard.blob
            && self.cache.is_fresh(blob, now)
        {
            return Ok(Some(blob.clone()));
        }

        for producer in &self.producers {
            if let Some(bytes) = producer.produce(&resolved).await? {
                let content_type = self
                    .content_types
                    .lookup(&resolved)
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let blob = Arc::new(CachedBlob {
                    bytes,
                    content_type,
                    generated_at: now,
                });
                guard.blob = Some(blob.clone());
                debug!(path, resolved, producer = producer.name(), "produced blob");
                return Ok(Some(blob));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingProducer {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingProducer {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl Producer for CountingProducer {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn produce(&self, path: &str) -> Result<Option<Bytes>, ProduceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if path == "/hit" {
                Ok(Some(Bytes::from_static(b"payload")))
            } else {
                Ok(None)
            }
        }
    }

    fn chain_with(producer: Arc<dyn Producer>) -> ProducerChain {
        let mut chain = ProducerChain::new(Duration::from_secs(60));
        chain.push_producer(producer);
        chain
    }

    #[tokio::test]
    async fn test_first_producer_wins() {
        // given: two producers that both know the path
        let mut chain = ProducerChain::new(Duration::from_secs(60));
        let mut first = SyntheticProducer::new();
        first.register("/x", "first".to_string());
        let mut second = SyntheticProducer::new();
        second.register("/x", "second".to_string());
        chain.push_producer(Arc::new(first));
        chain.push_producer(Arc::new(second));

        // when:
        let blob = chain.get("/x").await.unwrap().unwrap();

        // then:
        assert_eq!(blob.bytes, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_producers() {
        // given:
        let producer = Arc::new(CountingProducer::new(Duration::ZERO));
        let chain = chain_with(producer.clone());

        // when: the same path is fetched twice
        chain.get("/hit").await.unwrap().unwrap();
        chain.get("/hit").await.unwrap().unwrap();

        // then: only one production ran
        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_production() {
        // given: a slow producer
        let producer = Arc::new(CountingProducer::new(Duration::from_millis(50)));
        let chain = Arc::new(chain_with(producer.clone()));

        // when: four tasks race on the same path
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let chain = chain.clone();
            tasks.push(tokio::spawn(async move { chain.get("/hit").await }));
        }
        for task in tasks {
            let blob = task.await.unwrap().unwrap().unwrap();
            assert_eq!(blob.bytes, Bytes::from_static(b"payload"));
        }

        // then:
        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        // given:
        let chain = chain_with(Arc::new(CountingProducer::new(Duration::ZERO)));

        // then:
        assert!(chain.get("/miss").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_type_applied_to_resolved_path() {
        // given: an alias into a synthetic file plus a content-type rule
        let mut chain = ProducerChain::new(Duration::from_secs(60));
        chain.aliases_mut().add_literal("/", "/pages/main.html");
        chain
            .content_types_mut()
            .add(r".*\.html", "text/html; charset=utf-8")
            .unwrap();
        let mut synthetic = SyntheticProducer::new();
        synthetic.register("/pages/main.html", "<html/>".to_string());
        chain.push_producer(Arc::new(synthetic));

        // when:
        let blob = chain.get("/").await.unwrap().unwrap();

        // then:
        assert_eq!(blob.content_type, "text/html; charset=utf-8");
        assert_eq!(blob.bytes, Bytes::from_static(b"<html/>"));
    }

    #[tokio::test]
    async fn test_alias_cycle_is_an_error() {
        // given:
        let mut chain = ProducerChain::new(Duration::from_secs(60));
        chain.aliases_mut().add_literal("/a", "/b");
        chain.aliases_mut().add_literal("/b", "/a");

        // then:
        assert!(matches!(
            chain.get("/a").await,
            Err(ProduceError::AliasCycle(_))
        ));
    }
}
