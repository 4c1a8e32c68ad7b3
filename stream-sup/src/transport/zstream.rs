//! Zenoh-backed stream transport.
//!
//! Every stream is a key expression `{vhost}/stream/{name}` and every sample
//! is one delivery. The sample attachment carries a [`ChunkHeader`] with the
//! entry count, the chunk offset and a CRC32 of the payload.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, trace, warn};
use zenoh::{Result, Session, Wait, sample::Sample};

use super::{DeliveryContext, Environment, Message, MessageHandler, Transport, TransportConsumer};
use crate::Builder;
use crate::attachment::ChunkHeader;
use crate::config::{ConnectionConfig, ConsumerOptions, OffsetSpec};

const OVERRIDE_ENV: &str = "STREAM_SUP_ZENOH_OVERRIDE";
const DISPATCH_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Client,
    Peer,
    Router,
}

pub struct ZenohTransportBuilder {
    mode: SessionMode,
    connect_to_host: bool,
    config_overrides: Vec<(String, serde_json::Value)>,
}

impl Default for ZenohTransportBuilder {
    fn default() -> Self {
        Self {
            mode: SessionMode::Client,
            connect_to_host: true,
            config_overrides: Vec::new(),
        }
    }
}

impl ZenohTransportBuilder {
    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a JSON configuration override applied to every session.
    pub fn with_json<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.config_overrides.push((key.into(), value));
        self
    }

    pub fn disable_multicast_scouting(self) -> Self {
        self.with_json("scouting/multicast/enabled", json!(false))
    }

    /// Open sessions without dialing the configured host. Deliveries then only
    /// reach publishers declared on the same session.
    pub fn without_connect(mut self) -> Self {
        self.connect_to_host = false;
        self
    }
}

impl Builder for ZenohTransportBuilder {
    type Output = ZenohTransport;

    fn build(mut self) -> Result<ZenohTransport> {
        if let Ok(raw) = std::env::var(OVERRIDE_ENV) {
            debug!(overrides = %raw, "zenoh overrides from {}", OVERRIDE_ENV);
            self.config_overrides.extend(parse_overrides(&raw)?);
        }
        Ok(ZenohTransport {
            mode: self.mode,
            connect_to_host: self.connect_to_host,
            config_overrides: self.config_overrides,
        })
    }
}

/// Parse `key=value;key=value` where every value is JSON5. Blank segments are
/// ignored; the first malformed one fails the whole list.
fn parse_overrides(raw: &str) -> Result<Vec<(String, serde_json::Value)>> {
    raw.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| -> Result<(String, serde_json::Value)> {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| format!("{OVERRIDE_ENV}: expected key=value, got '{segment}'"))?;
            let key = key.trim();
            let value = json5::from_str::<serde_json::Value>(value.trim())
                .map_err(|e| format!("{OVERRIDE_ENV}: bad value for '{key}': {e}"))?;
            Ok((key.to_string(), value))
        })
        .collect()
}

pub struct ZenohTransport {
    mode: SessionMode,
    connect_to_host: bool,
    config_overrides: Vec<(String, serde_json::Value)>,
}

impl ZenohTransport {
    pub fn builder() -> ZenohTransportBuilder {
        ZenohTransportBuilder::default()
    }

    fn session_config(&self, connection: &ConnectionConfig) -> Result<zenoh::Config> {
        let mut overrides: Vec<(String, serde_json::Value)> = vec![
            ("mode".into(), json!(self.mode.to_string())),
            (
                "transport/unicast/open_timeout".into(),
                json!(connection.rpc_timeout.as_millis() as u64),
            ),
            ("transport/auth/usrpwd/user".into(), json!(connection.user)),
            (
                "transport/auth/usrpwd/password".into(),
                json!(connection.password),
            ),
        ];
        if self.connect_to_host {
            overrides.push((
                "connect/endpoints".into(),
                json!([format!("tcp/{}:{}", connection.host, connection.port)]),
            ));
        }
        overrides.extend(self.config_overrides.iter().cloned());

        let mut config = zenoh::Config::default();
        for (key, value) in overrides {
            let value_str = serde_json::to_string(&value)
                .map_err(|e| format!("Failed to serialize value for key '{}': {}", key, e))?;
            config.insert_json5(&key, &value_str).map_err(|e| {
                // Never echo credentials back into logs.
                format!("Failed to apply config override '{}': {}", key, e)
            })?;
        }
        Ok(config)
    }
}

impl Transport for ZenohTransport {
    type Environment = ZenohEnvironment;

    #[tracing::instrument(name = "zenoh_connect", skip(self, connection), fields(
        host = %connection.host,
        port = connection.port,
        vhost = %connection.vhost,
    ))]
    fn connect(&self, connection: &ConnectionConfig) -> Result<ZenohEnvironment> {
        let config = self.session_config(connection)?;
        let session = zenoh::open(config).wait()?;
        info!("[ENV] Session open: zid={}", session.zid());

        Ok(ZenohEnvironment {
            session: Arc::new(session),
            namespace: namespace_for(&connection.vhost),
            max_consumers: connection.max_consumers,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// One zenoh session shared by up to `max_consumers` consumers.
///
/// The session closes when the last handle to it is dropped; nothing here
/// blocks on drop, so environments and consumers may be dropped from any
/// runtime flavor. Blocking calls (`connect`, `create_consumer`, `close`)
/// need a thread that may block: the blocking pool or a multi-thread runtime.
pub struct ZenohEnvironment {
    session: Arc<Session>,
    namespace: String,
    max_consumers: usize,
    active: Arc<AtomicUsize>,
}

impl ZenohEnvironment {
    pub fn key_expr(&self, stream: &str) -> String {
        format!("{}/stream/{}", self.namespace, stream)
    }

    pub fn active_consumers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Publisher on this environment's session, mostly for demos and tests.
    pub fn publisher(&self, stream: &str) -> Result<StreamPublisher> {
        let inner = self.session.declare_publisher(self.key_expr(stream)).wait()?;
        Ok(StreamPublisher {
            inner,
            next_offset: AtomicUsize::new(0),
        })
    }

    fn reserve_slot(&self) -> Result<()> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_consumers).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|n| {
                format!(
                    "environment already serves {} consumers (max {})",
                    n, self.max_consumers
                )
                .into()
            })
    }
}

impl Environment for ZenohEnvironment {
    type Consumer = ZenohConsumer;

    #[tracing::instrument(name = "create_consumer", skip(self, options, handler), fields(
        credits = options.initial_credits,
        crc_check = options.crc_check,
    ))]
    fn create_consumer(
        &self,
        stream: &str,
        options: &ConsumerOptions,
        handler: MessageHandler,
    ) -> Result<ZenohConsumer> {
        self.reserve_slot()?;

        let key_expr = self.key_expr(stream);
        debug!("[CONSUMER] Key expression: {}", key_expr);

        let credits = usize::from(options.initial_credits.max(1));
        let (tx, rx) = flume::bounded::<Sample>(credits);
        let closed = Arc::new(AtomicBool::new(false));

        let dispatcher = Dispatcher {
            stream: Arc::from(stream),
            offset: options.offset,
            crc_check: options.crc_check,
            handler,
        };
        let dispatch_closed = closed.clone();
        let dispatch = std::thread::Builder::new()
            .name(format!("dispatch-{stream}"))
            .spawn(move || dispatcher.run(rx, dispatch_closed))
            .map_err(|e| {
                self.active.fetch_sub(1, Ordering::AcqRel);
                zenoh::Error::from(format!("failed to spawn dispatcher: {}", e))
            })?;

        // A full channel blocks the callback until the dispatcher frees a credit.
        let subscriber = self
            .session
            .declare_subscriber(key_expr)
            .callback(move |sample| {
                let _ = tx.send(sample);
            })
            .wait();
        let subscriber = match subscriber {
            Ok(s) => s,
            Err(e) => {
                closed.store(true, Ordering::Release);
                let _ = dispatch.join();
                self.active.fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            }
        };

        info!("[CONSUMER] Consumer ready: stream={}", stream);

        Ok(ZenohConsumer {
            stream: stream.to_string(),
            subscriber: Some(subscriber),
            dispatch: Some(dispatch),
            closed,
            slots: self.active.clone(),
        })
    }
}

struct Dispatcher {
    stream: Arc<str>,
    offset: OffsetSpec,
    crc_check: bool,
    handler: MessageHandler,
}

impl Dispatcher {
    fn run(self, rx: flume::Receiver<Sample>, closed: Arc<AtomicBool>) {
        loop {
            match rx.recv_timeout(DISPATCH_POLL) {
                Ok(sample) => self.deliver(&sample),
                Err(flume::RecvTimeoutError::Timeout) => {
                    if closed.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        // Drain whatever was already credited before the close.
        while let Ok(sample) = rx.try_recv() {
            self.deliver(&sample);
        }
        trace!("[CONSUMER] Dispatcher exited: stream={}", self.stream);
    }

    fn deliver(&self, sample: &Sample) {
        let payload = sample.payload().to_bytes();
        let header = match sample.attachment().map(ChunkHeader::try_from) {
            Some(Ok(header)) => Some(header),
            Some(Err(e)) => {
                warn!("[CONSUMER] Bad chunk header on {}: {}", self.stream, e);
                return;
            }
            None => None,
        };

        let (chunk_offset, entries_count) = header
            .map(|h| (h.chunk_offset, h.entries_count))
            .unwrap_or((0, 1));

        if !self.offset.admits(chunk_offset) {
            trace!("[CONSUMER] Skipping chunk {} on {}", chunk_offset, self.stream);
            return;
        }

        if self.crc_check {
            if let Some(h) = header {
                if !h.matches(&payload) {
                    warn!(
                        "[CONSUMER] CRC mismatch on {} chunk {}, dropping delivery",
                        self.stream, chunk_offset
                    );
                    return;
                }
            }
        }

        let ctx = DeliveryContext::new(self.stream.clone(), chunk_offset, entries_count);
        (self.handler)(&ctx, &Message { payload: &payload });
    }
}

pub struct ZenohConsumer {
    stream: String,
    subscriber: Option<zenoh::pubsub::Subscriber<()>>,
    dispatch: Option<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
    slots: Arc<AtomicUsize>,
}

impl TransportConsumer for ZenohConsumer {
    fn close(mut self) -> Result<()> {
        let undeclared = match self.subscriber.take() {
            Some(subscriber) => subscriber.undeclare().wait(),
            None => Ok(()),
        };
        self.closed.store(true, Ordering::Release);
        if let Some(dispatch) = self.dispatch.take() {
            if dispatch.join().is_err() {
                warn!("[CONSUMER] Dispatcher panicked: stream={}", self.stream);
            }
        }
        undeclared?;
        info!("[CONSUMER] Consumer closed: stream={}", self.stream);
        Ok(())
    }
}

impl Drop for ZenohConsumer {
    // Without `close`, the subscriber is undeclared by zenoh's own drop and the
    // dispatcher is left to drain and exit once the sender side goes away.
    fn drop(&mut self) {
        self.subscriber.take();
        self.closed.store(true, Ordering::Release);
        self.dispatch.take();
        self.slots.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Publishes chunk payloads with a [`ChunkHeader`] attachment.
pub struct StreamPublisher {
    inner: zenoh::pubsub::Publisher<'static>,
    next_offset: AtomicUsize,
}

impl StreamPublisher {
    /// Publish one chunk holding `entries_count` entries; returns its offset.
    pub fn publish_chunk(&self, payload: &[u8], entries_count: u32) -> Result<u64> {
        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed) as u64;
        let header = ChunkHeader::for_payload(offset, entries_count, payload);
        self.inner.put(payload.to_vec()).attachment(header).wait()?;
        Ok(offset)
    }
}

fn namespace_for(vhost: &str) -> String {
    let trimmed = vhost.trim_matches('/');
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}
