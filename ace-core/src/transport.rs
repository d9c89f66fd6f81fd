//! Serial transport: port lifecycle, the reader/writer reactor tasks, and
//! the in-flight lock that bounds the wire to at most one outstanding
//! request. Everything here is `!Send` by design and is expected to run on
//! a single-threaded Tokio `LocalSet`, per the concurrency model.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AceError;
use crate::frame;
use crate::protocol::{DeviceStatus, Request, Response, SlotStatus};
use crate::router::{Continuation, Router};
use crate::state::DeviceStateCache;

/// What the orchestrator and endless-spool monitor need from the wire: send
/// a request and read the cached device status. Implemented by [`Transport`]
/// and, in tests, by a scripted fake — see `test_support`.
#[async_trait(?Send)]
pub trait DeviceLink {
    async fn send_request(&self, method: &str, params: Value) -> Result<Response, AceError>;
    fn is_device_ready(&self) -> bool;
    fn device_slot_status(&self, index: usize) -> Option<SlotStatus>;
    /// Record the tool currently loaded (-1 for none) so that a later
    /// reconnect can automatically re-issue `start_feed_assist` for it,
    /// per the data-model invariant in §3.
    fn note_current_loaded_index(&self, index: i32);
}

struct Outbound {
    method: String,
    params: Value,
    continuation: Continuation,
}

/// State shared by the reader, writer, and connect tasks.
struct Shared {
    config: Config,
    router: RefCell<Router>,
    state_cache: RefCell<DeviceStateCache>,
    outbound: RefCell<VecDeque<Outbound>>,
    locked: Cell<bool>,
    locked_at: Cell<Option<Instant>>,
    /// Last tool the caller reported as loaded, re-sent as `start_feed_assist`
    /// on every reconnect. -1 means nothing is loaded.
    loaded_index: Cell<i32>,
}

/// Handle used by the command surface and orchestrator to talk to the
/// device and read the latest cached status.
#[derive(Clone)]
pub struct Transport {
    shared: Rc<Shared>,
}

impl Transport {
    pub fn new(config: Config) -> Self {
        Transport {
            shared: Rc::new(Shared {
                config,
                router: RefCell::new(Router::new()),
                state_cache: RefCell::new(DeviceStateCache::default()),
                outbound: RefCell::new(VecDeque::new()),
                locked: Cell::new(false),
                locked_at: Cell::new(None),
                loaded_index: Cell::new(-1),
            }),
        }
    }

    /// Record the tool currently loaded (-1 for none). Read by the connect
    /// loop on every (re)connect to automatically re-enable feed-assist for
    /// it, per the reconnect invariant in §3.
    pub fn note_current_loaded_index(&self, index: i32) {
        self.shared.loaded_index.set(index);
    }

    pub fn state_cache(&self) -> &RefCell<DeviceStateCache> {
        &self.shared.state_cache
    }

    /// Number of requests currently queued but not yet handed to the writer.
    pub fn pending_outbound_count(&self) -> usize {
        self.shared.outbound.borrow().len()
    }

    /// Whether the in-flight lock is currently held, i.e. a request has been
    /// sent and no response (or forced timeout) has cleared it yet.
    pub fn is_locked(&self) -> bool {
        self.shared.locked.get()
    }

    /// Enqueue `method`/`params` and await its response, bounded by the
    /// request-timeout window. The writer drains the queue FIFO.
    pub async fn send_request(&self, method: impl Into<String>, params: Value) -> Result<Response, AceError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.shared.outbound.borrow_mut().push_back(Outbound {
            method: method.into(),
            params,
            continuation: Continuation::Command(tx),
        });
        match tokio::time::timeout(Duration::from_secs(2), rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(AceError::Timeout(0)),
            Err(_) => Err(AceError::Timeout(0)),
        }
    }

    /// Spawn the connect/reader/writer tasks onto the current `LocalSet`.
    /// Must be called from within `LocalSet::run_until` or an equivalent
    /// `spawn_local`-capable context.
    pub fn spawn(&self) {
        let shared = self.shared.clone();
        tokio::task::spawn_local(connect_loop(shared));
    }
}

#[async_trait(?Send)]
impl DeviceLink for Transport {
    async fn send_request(&self, method: &str, params: Value) -> Result<Response, AceError> {
        Transport::send_request(self, method.to_string(), params).await
    }

    fn is_device_ready(&self) -> bool {
        self.shared.state_cache.borrow().is_ready()
    }

    fn device_slot_status(&self, index: usize) -> Option<SlotStatus> {
        self.shared.state_cache.borrow().slot_status(index)
    }

    fn note_current_loaded_index(&self, index: i32) {
        Transport::note_current_loaded_index(self, index)
    }
}

fn find_ace_port() -> Option<String> {
    let ports = serialport::available_ports().ok()?;
    ports.into_iter().find_map(|p| {
        let matches = match &p.port_type {
            serialport::SerialPortType::UsbPort(usb) => usb
                .product
                .as_deref()
                .map(|product| product.contains("ACE"))
                .unwrap_or(false),
            _ => false,
        };
        matches.then_some(p.port_name)
    })
}

async fn connect_loop(shared: Rc<Shared>) {
    loop {
        // Per §4.2, the `connect` task always enumerates system serial ports
        // and picks the first whose description contains "ACE"; the
        // configured `serial` value is never used to open the port directly
        // (it exists only so it can be logged alongside whatever port
        // enumeration actually finds).
        let Some(path) = find_ace_port() else {
            debug!(configured = %shared.config.serial, "no ACE serial port found");
            tokio::time::sleep(Duration::from_millis(shared.config.connect_poll_interval_ms)).await;
            continue;
        };

        match tokio_serial::new(&path, shared.config.baud).open_native_async() {
            Ok(port) => {
                info!(port = %path, baud = shared.config.baud, "ACE serial port opened");
                shared.locked.set(false);
                shared.locked_at.set(None);
                shared.router.borrow_mut().clear();

                let (read_half, write_half) = tokio::io::split(port);

                enqueue_reconnect_handshake(&shared);
                enqueue_reconnect_feed_assist(&shared);

                let mut reader = tokio::task::spawn_local(reader_task(shared.clone(), read_half));
                let mut writer = tokio::task::spawn_local(writer_task(shared.clone(), write_half));

                tokio::select! {
                    res = &mut reader => {
                        warn!(result = ?res, "reader task ended, tearing down transport");
                    }
                    res = &mut writer => {
                        warn!(result = ?res, "writer task ended, tearing down transport");
                    }
                }
                reader.abort();
                writer.abort();

                shared.router.borrow_mut().clear();
                shared.outbound.borrow_mut().clear();
                shared.locked.set(false);
                shared.locked_at.set(None);
            }
            Err(e) => {
                debug!(port = %path, error = %e, "failed to open ACE serial port");
            }
        }

        tokio::time::sleep(Duration::from_millis(shared.config.connect_poll_interval_ms)).await;
    }
}

/// On (re)connect, issue `get_info`.
fn enqueue_reconnect_handshake(shared: &Rc<Shared>) {
    let (tx, _rx) = tokio::sync::oneshot::channel();
    shared.outbound.borrow_mut().push_back(Outbound {
        method: "get_info".to_string(),
        params: Value::Object(Default::default()),
        continuation: Continuation::Command(tx),
    });
}

/// Re-enable feed-assist for whichever tool [`Transport::note_current_loaded_index`]
/// last recorded, if any — run on every (re)connect, not just the first.
fn enqueue_reconnect_feed_assist(shared: &Rc<Shared>) {
    let index = shared.loaded_index.get();
    if index < 0 {
        return;
    }
    let (tx, _rx) = tokio::sync::oneshot::channel();
    shared.outbound.borrow_mut().push_back(Outbound {
        method: "start_feed_assist".to_string(),
        params: serde_json::json!({ "index": index }),
        continuation: Continuation::Command(tx),
    });
}

async fn writer_task(shared: Rc<Shared>, mut sink: impl tokio::io::AsyncWrite + Unpin) -> Result<(), AceError> {
    loop {
        tokio::time::sleep(Duration::from_millis(shared.config.writer_period_ms)).await;

        if shared.locked.get() {
            continue;
        }

        let next = shared.outbound.borrow_mut().pop_front();
        let (method, params, continuation) = match next {
            Some(req) => (req.method, req.params, req.continuation),
            None => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                spawn_status_poll_listener(shared.clone(), rx);
                ("get_status".to_string(), Value::Object(Default::default()), Continuation::StatusPoll(tx))
            }
        };

        let id = shared.router.borrow_mut().next_id();
        let request = Request::new(id, method, params);
        let payload = serde_json::to_vec(&request)?;
        let framed = frame::encode(&payload);

        shared.router.borrow_mut().register(id, continuation);

        if let Err(e) = sink.write_all(&framed).await {
            error!(error = %e, "serial write failed");
            return Err(AceError::Transport(e));
        }
        shared.locked.set(true);
        shared.locked_at.set(Some(Instant::now()));
    }
}

/// Updates the device state cache from a default `get_status` poll's response.
fn spawn_status_poll_listener(shared: Rc<Shared>, rx: tokio::sync::oneshot::Receiver<Response>) {
    tokio::task::spawn_local(async move {
        if let Ok(response) = rx.await {
            if response.is_success() {
                match serde_json::from_value::<DeviceStatus>(response.result) {
                    Ok(status) => shared.state_cache.borrow_mut().update(status),
                    Err(e) => warn!(error = %e, "failed to parse get_status result"),
                }
            }
        }
    });
}

async fn reader_task(shared: Rc<Shared>, mut source: impl tokio::io::AsyncRead + Unpin) -> Result<(), AceError> {
    let mut accumulator: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        if shared.locked.get() {
            if let Some(sent_at) = shared.locked_at.get() {
                if sent_at.elapsed() > Duration::from_secs(2) {
                    warn!("request exceeded timeout window, clearing in-flight lock");
                    shared.locked.set(false);
                    shared.locked_at.set(None);
                    accumulator.clear();
                }
            }
        }

        let period = Duration::from_millis(shared.config.reader_period_ms);
        let read_result = tokio::time::timeout(period, source.read(&mut buf)).await;

        match read_result {
            Ok(Ok(0)) => {
                return Err(AceError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial port closed",
                )));
            }
            Ok(Ok(n)) => accumulator.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => return Err(AceError::Transport(e)),
            Err(_) => {}
        }

        match frame::decode(&accumulator) {
            Ok(Some(decoded)) => {
                let consumed = decoded.consumed;
                let payload = decoded.payload.to_vec();
                accumulator.drain(..consumed);

                match serde_json::from_slice::<Response>(&payload) {
                    Ok(response) => {
                        shared.router.borrow_mut().resolve(response);
                        shared.locked.set(false);
                        shared.locked_at.set(None);
                    }
                    Err(e) => warn!(error = %e, "failed to parse response payload"),
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "framing error, discarding accumulator");
                accumulator.clear();
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
