//! Stream name to consumer mapping shared by startup, reporter and shutdown.
//!
//! Writers take the exclusive lock only while inserting; the reporter takes a
//! shared lock just long enough to clone the counter handles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::consumer::StreamConsumer;
use crate::metrics::{ConsumerMetrics, MetricsSnapshot};
use crate::transport::Environment;

pub struct ConsumerRegistry<E: Environment> {
    inner: RwLock<Inner<E>>,
}

struct Inner<E: Environment> {
    /// Every handle ever registered, in registration order.
    entries: Vec<StreamConsumer<E>>,
    /// Index of the addressable handle for each name (last registration wins).
    by_name: HashMap<String, usize>,
}

impl<E: Environment> Default for ConsumerRegistry<E> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                by_name: HashMap::new(),
            }),
        }
    }
}

impl<E: Environment> ConsumerRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle under its stream name.
    ///
    /// A handle already registered under the same name stops being
    /// addressable, but its counters still feed the totals and it is still
    /// closed by [`ConsumerRegistry::drain`].
    pub fn insert(&self, consumer: StreamConsumer<E>) {
        let mut inner = self.inner.write();
        let name = consumer.stream().to_string();
        let idx = inner.entries.len();
        inner.entries.push(consumer);
        if inner.by_name.insert(name.clone(), idx).is_some() {
            warn!("stream {} registered more than once, keeping the latest consumer", name);
        }
    }

    /// Number of addressable stream names.
    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, stream: &str) -> bool {
        self.inner.read().by_name.contains_key(stream)
    }

    /// Addressable stream names in registration order.
    pub fn streams(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut named: Vec<(usize, &String)> =
            inner.by_name.iter().map(|(name, idx)| (*idx, name)).collect();
        named.sort_unstable_by_key(|(idx, _)| *idx);
        named.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Counters of the addressable consumer for `stream`.
    pub fn metrics_for(&self, stream: &str) -> Option<Arc<ConsumerMetrics>> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(stream)
            .map(|idx| inner.entries[*idx].metrics().clone())
    }

    /// Copy of every counter handle, including displaced duplicates.
    pub fn metrics(&self) -> Vec<Arc<ConsumerMetrics>> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|c| c.metrics().clone())
            .collect()
    }

    /// Totals across every registered consumer, taken under one read lock.
    pub fn totals(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        MetricsSnapshot::sum(inner.entries.iter().map(|c| c.metrics().snapshot()))
    }

    /// Take every handle out for closing, in registration order.
    pub fn drain(&self) -> Vec<StreamConsumer<E>> {
        let mut inner = self.inner.write();
        inner.by_name.clear();
        std::mem::take(&mut inner.entries)
    }
}
