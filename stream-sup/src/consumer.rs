use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::{ConnectionConfig, ConsumerOptions};
use crate::error::{Error, Result};
use crate::metrics::ConsumerMetrics;
use crate::transport::{
    DeliveryContext, Environment, Message, MessageHandler, Transport, TransportConsumer,
};

/// One registered stream: the transport consumer plus its delivery counters.
///
/// The consumer is declared before the environment so that, when a handle is
/// dropped without [`StreamConsumer::close`], the consumer is released first.
pub struct StreamConsumer<E: Environment> {
    stream: String,
    consumer: E::Consumer,
    _environment: E,
    metrics: Arc<ConsumerMetrics>,
}

impl<E: Environment> StreamConsumer<E> {
    /// Open an environment for `stream` and register a counting consumer on it.
    #[tracing::instrument(name = "register", skip(transport, connection, options), fields(
        host = %connection.host,
        credits = options.initial_credits,
    ))]
    pub fn register<T>(
        stream: &str,
        transport: &T,
        connection: &ConnectionConfig,
        options: &ConsumerOptions,
    ) -> Result<Self>
    where
        T: Transport<Environment = E>,
    {
        let registration_error = |source| Error::Registration {
            stream: stream.to_string(),
            source,
        };

        let environment = transport.connect(connection).map_err(registration_error)?;
        let metrics = Arc::new(ConsumerMetrics::new());
        let consumer = environment
            .create_consumer(stream, options, counting_handler(metrics.clone()))
            .map_err(registration_error)?;

        debug!("[CONSUMER] Registered: stream={}", stream);

        Ok(Self {
            stream: stream.to_string(),
            consumer,
            _environment: environment,
            metrics,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn metrics(&self) -> &Arc<ConsumerMetrics> {
        &self.metrics
    }

    /// Stop the transport consumer. Consumes the handle, so it runs once.
    pub fn close(self) -> Result<()> {
        let Self {
            stream, consumer, ..
        } = self;
        consumer.close().map_err(|source| Error::Close {
            stream: stream.clone(),
            source,
        })?;
        info!("[CONSUMER] Closed: stream={}", stream);
        Ok(())
    }
}

/// Delivery callback: one delivery, plus the batch's entry count.
pub fn counting_handler(metrics: Arc<ConsumerMetrics>) -> MessageHandler {
    Arc::new(move |ctx: &DeliveryContext, _msg: &Message<'_>| {
        metrics.record_delivery(u64::from(ctx.entries_count()));
        trace!(
            stream = ctx.stream(),
            offset = ctx.chunk_offset(),
            entries = ctx.entries_count(),
            "delivery"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_counts_each_delivery_with_its_entries() {
        let metrics = Arc::new(ConsumerMetrics::new());
        let handler = counting_handler(metrics.clone());
        let stream: Arc<str> = Arc::from("orders");

        for (offset, entries) in [3u32, 1, 9].into_iter().enumerate() {
            let ctx = DeliveryContext::new(stream.clone(), offset as u64, entries);
            handler(&ctx, &Message { payload: b"x" });
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.consumed, 3);
        assert_eq!(snap.total_entries, 13);
    }
}
