use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use stockyard_events::{ObjectCreated, Subscription};

use super::{ObjectCreatedConsumer, ProcessingResult};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WiringError {
    #[error("bucket {bucket} is wired to both {existing} and {added}")]
    BucketTaken {
        bucket: String,
        existing: &'static str,
        added: &'static str,
    },

    #[error("consumer {name} is wired to both {first} and {second}")]
    ConsumerReused {
        name: &'static str,
        first: String,
        second: String,
    },
}

/// Bucket → consumer routing. Each bucket has at most one consumer and each
/// consumer serves exactly one bucket.
#[derive(Clone, Default)]
pub struct ConsumerRegistry {
    by_bucket: HashMap<String, Arc<dyn ObjectCreatedConsumer>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, consumer: Arc<dyn ObjectCreatedConsumer>) -> Result<(), WiringError> {
        let bucket = consumer.bucket().to_string();

        if let Some(existing) = self.by_bucket.get(&bucket) {
            return Err(WiringError::BucketTaken {
                bucket,
                existing: existing.name(),
                added: consumer.name(),
            });
        }
        if let Some((first, _)) = self
            .by_bucket
            .iter()
            .find(|(_, c)| c.name() == consumer.name())
        {
            return Err(WiringError::ConsumerReused {
                name: consumer.name(),
                first: first.clone(),
                second: bucket,
            });
        }

        info!(bucket = %bucket, consumer = consumer.name(), "wired object consumer");
        self.by_bucket.insert(bucket, consumer);
        Ok(())
    }

    pub fn consumer_for(&self, bucket: &str) -> Option<&Arc<dyn ObjectCreatedConsumer>> {
        self.by_bucket.get(bucket)
    }

    /// Route one notification to its bucket's consumer.
    pub async fn dispatch(&self, event: &ObjectCreated) -> ProcessingResult {
        match self.consumer_for(&event.bucket) {
            Some(consumer) => consumer.on_object_created(event).await,
            None => {
                warn!(bucket = %event.bucket, key = %event.key, "no consumer wired for bucket");
                ProcessingResult::Discarded {
                    reason: format!("no consumer for bucket {}", event.bucket),
                }
            }
        }
    }

    /// Drain `subscription` in the background, one task per notification.
    pub fn spawn(self, mut subscription: Subscription<ObjectCreated>) -> JoinHandle<()> {
        let registry = Arc::new(self);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    match registry.dispatch(&event).await {
                        ProcessingResult::Completed(s) => {
                            info!(bucket = %event.bucket, key = %event.key, success = s.success, failed = s.failed, "object ingested");
                        }
                        ProcessingResult::Duplicate(_) => {
                            info!(bucket = %event.bucket, key = %event.key, "duplicate notification");
                        }
                        ProcessingResult::Discarded { reason } => {
                            warn!(bucket = %event.bucket, key = %event.key, reason = %reason, "notification discarded");
                        }
                        ProcessingResult::Failed { error } => {
                            warn!(bucket = %event.bucket, key = %event.key, error = %error, "object ingestion failed");
                        }
                    }
                });
            }
            info!("object notification stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use stockyard_events::{EventBus, InMemoryEventBus};

    use crate::ingest::FileSummary;

    struct Recorder {
        name: &'static str,
        bucket: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(name: &'static str, bucket: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                bucket,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ObjectCreatedConsumer for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn bucket(&self) -> &str {
            self.bucket
        }

        async fn on_object_created(&self, event: &ObjectCreated) -> ProcessingResult {
            self.seen.lock().unwrap().push(event.key.clone());
            ProcessingResult::Completed(FileSummary::default())
        }
    }

    #[test]
    fn two_consumers_on_one_bucket_is_rejected() {
        let mut registry = ConsumerRegistry::new();
        registry.register(Recorder::new("inventory", "uploads")).unwrap();
        let err = registry.register(Recorder::new("templates", "uploads")).unwrap_err();
        assert!(matches!(err, WiringError::BucketTaken { .. }));
    }

    #[test]
    fn one_consumer_on_two_buckets_is_rejected() {
        let mut registry = ConsumerRegistry::new();
        registry.register(Recorder::new("inventory", "uploads")).unwrap();
        let err = registry.register(Recorder::new("inventory", "templates")).unwrap_err();
        assert!(matches!(err, WiringError::ConsumerReused { .. }));
    }

    #[tokio::test]
    async fn routes_by_bucket() {
        let inventory = Recorder::new("inventory", "uploads");
        let templates = Recorder::new("templates", "template-uploads");
        let mut registry = ConsumerRegistry::new();
        registry.register(inventory.clone()).unwrap();
        registry.register(templates.clone()).unwrap();

        registry.dispatch(&ObjectCreated::new("uploads", "a.csv", 1, "v")).await;
        registry.dispatch(&ObjectCreated::new("template-uploads", "b.csv", 1, "v")).await;
        let unrouted = registry.dispatch(&ObjectCreated::new("elsewhere", "c.csv", 1, "v")).await;

        assert_eq!(*inventory.seen.lock().unwrap(), vec!["a.csv"]);
        assert_eq!(*templates.seen.lock().unwrap(), vec!["b.csv"]);
        assert!(matches!(unrouted, ProcessingResult::Discarded { .. }));
    }

    #[tokio::test]
    async fn spawned_loop_consumes_published_notifications() {
        let bus = InMemoryEventBus::<ObjectCreated>::new();
        let inventory = Recorder::new("inventory", "uploads");
        let mut registry = ConsumerRegistry::new();
        registry.register(inventory.clone()).unwrap();
        let handle = registry.spawn(bus.subscribe());

        bus.publish(ObjectCreated::new("uploads", "a.csv", 1, "v")).unwrap();

        for _ in 0..100 {
            if !inventory.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*inventory.seen.lock().unwrap(), vec!["a.csv"]);
        handle.abort();
    }
}
