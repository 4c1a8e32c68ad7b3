#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stream_sup::Result;
use stream_sup::config::{ConnectionConfig, ConsumerOptions, SupervisorConfig};
use stream_sup::transport::{
    DeliveryContext, Environment, Message, MessageHandler, Transport, TransportConsumer,
};

/// Shared view of what the mock transport has been asked to do.
#[derive(Default)]
pub struct MockState {
    pub connect_attempts: Vec<String>,
    pub handlers: HashMap<String, Vec<MessageHandler>>,
    pub closed: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
    fail_register: Arc<HashSet<String>>,
    fail_close: Arc<HashSet<String>>,
    hang_close: Arc<HashSet<String>>,
    register_delay: Duration,
    close_delay: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_register<I: IntoIterator<Item = &'static str>>(mut self, streams: I) -> Self {
        self.fail_register = Arc::new(streams.into_iter().map(String::from).collect());
        self
    }

    pub fn failing_close<I: IntoIterator<Item = &'static str>>(mut self, streams: I) -> Self {
        self.fail_close = Arc::new(streams.into_iter().map(String::from).collect());
        self
    }

    /// Make `close` block for `delay` on the listed streams.
    pub fn with_close_delay<I: IntoIterator<Item = &'static str>>(
        mut self,
        streams: I,
        delay: Duration,
    ) -> Self {
        self.hang_close = Arc::new(streams.into_iter().map(String::from).collect());
        self.close_delay = delay;
        self
    }

    pub fn with_register_delay(mut self, delay: Duration) -> Self {
        self.register_delay = delay;
        self
    }

    /// Deliver one message with `entries` batch entries to every consumer
    /// registered for `stream`.
    pub fn deliver(&self, stream: &str, entries: u32) {
        let handlers = self
            .state
            .lock()
            .handlers
            .get(stream)
            .cloned()
            .unwrap_or_default();
        let ctx = DeliveryContext::new(Arc::from(stream), 0, entries);
        for handler in handlers {
            handler(&ctx, &Message { payload: b"chunk" });
        }
    }

    pub fn closed(&self) -> Vec<String> {
        self.state.lock().closed.clone()
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.state.lock().connect_attempts.clone()
    }
}

pub struct MockEnvironment {
    transport: MockTransport,
}

pub struct MockConsumer {
    stream: String,
    fail: bool,
    close_delay: Duration,
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    type Environment = MockEnvironment;

    fn connect(&self, connection: &ConnectionConfig) -> Result<MockEnvironment> {
        self.state.lock().connect_attempts.push(connection.host.clone());
        Ok(MockEnvironment {
            transport: self.clone(),
        })
    }
}

impl Environment for MockEnvironment {
    type Consumer = MockConsumer;

    fn create_consumer(
        &self,
        stream: &str,
        _options: &ConsumerOptions,
        handler: MessageHandler,
    ) -> Result<MockConsumer> {
        if !self.transport.register_delay.is_zero() {
            std::thread::sleep(self.transport.register_delay);
        }
        if self.transport.fail_register.contains(stream) {
            return Err(format!("stream {stream} does not exist").into());
        }
        self.transport
            .state
            .lock()
            .handlers
            .entry(stream.to_string())
            .or_default()
            .push(handler);
        Ok(MockConsumer {
            stream: stream.to_string(),
            fail: self.transport.fail_close.contains(stream),
            close_delay: if self.transport.hang_close.contains(stream) {
                self.transport.close_delay
            } else {
                Duration::ZERO
            },
            state: self.transport.state.clone(),
        })
    }
}

impl TransportConsumer for MockConsumer {
    fn close(self) -> Result<()> {
        if !self.close_delay.is_zero() {
            std::thread::sleep(self.close_delay);
        }
        if self.fail {
            return Err("connection reset while closing".into());
        }
        self.state.lock().closed.push(self.stream);
        Ok(())
    }
}

pub fn config_for(streams: &[&str]) -> SupervisorConfig {
    SupervisorConfig::default()
        .with_streams(streams.iter().copied())
        .with_log_interval(Duration::from_secs(1))
}
