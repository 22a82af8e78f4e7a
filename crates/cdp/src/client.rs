//! Protocol client: the single point where frames enter and leave.
//!
//! Design decisions, in order of importance:
//! 1. One pipe per browser; every session is multiplexed over it.
//! 2. One sequential dispatch loop. Frames are never handled
//!    concurrently, so causal order on the wire is preserved in
//!    delivery order and the pending map needs no extra locking
//!    discipline beyond the concurrent map itself.
//! 3. Responses correlate by id, never by arrival order.
//! 4. Fail fast: a dead transport fails every outstanding call once
//!    and is never retried.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{CdpError, Result};
use crate::proto::{
    decode_event, CdpEvent, Command, CommandFrame, CommandId, ErrorObject, InboundFrame,
};
use crate::registry::TargetRegistry;
use crate::transport;

/// Connection- or session-scoped event handler.
pub type EventCallback = Arc<dyn Fn(&CdpEvent) + Send + Sync>;

struct ResponsePayload {
    result: Option<Value>,
    error: Option<ErrorObject>,
}

pub struct CdpClient {
    /// Monotonic command id counter. Atomic so concurrent senders never
    /// collide regardless of calling order.
    next_id: AtomicU64,

    /// Outstanding calls awaiting a response, keyed by command id.
    /// Senders insert, only the dispatch loop removes.
    pending: DashMap<CommandId, oneshot::Sender<ResponsePayload>>,

    /// Write half of the pipe, serialized across concurrent senders.
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,

    /// Connection-level event handlers by method name.
    handlers: DashMap<String, Vec<EventCallback>>,

    closed: AtomicBool,

    /// Instant of the last inbound frame, for idle detection.
    cursor: std::sync::Mutex<Instant>,
}

impl CdpClient {
    /// Wire up a client over an established duplex stream and spawn its
    /// dispatch loop. Lifecycle events feed the given registry.
    pub fn start<R, W>(
        reader: R,
        writer: W,
        registry: Arc<TargetRegistry>,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            writer: Mutex::new(Box::new(writer)),
            handlers: DashMap::new(),
            closed: AtomicBool::new(false),
            cursor: std::sync::Mutex::new(Instant::now()),
        });

        let handle = tokio::spawn({
            let client = client.clone();
            async move {
                client.dispatch_loop(BufReader::new(reader), registry).await;
            }
        });

        (client, handle)
    }

    // Sending -----------------------------------------------------------------

    /// Send a typed command and await its decoded response.
    pub async fn send<C: Command>(
        &self,
        cmd: &C,
        session_id: Option<&str>,
    ) -> Result<C::Response> {
        let result = self
            .send_raw(C::METHOD, serde_json::to_value(cmd)?, session_id)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Typed send in ignore-errors mode: protocol errors are logged and
    /// swallowed. For fire-and-forget bookkeeping only.
    pub async fn send_lenient<C: Command>(
        &self,
        cmd: &C,
        session_id: Option<&str>,
    ) -> Result<Option<C::Response>> {
        match self.send(cmd, session_id).await {
            Ok(resp) => Ok(Some(resp)),
            Err(CdpError::Protocol { code, message }) => {
                tracing::debug!(method = C::METHOD, code, %message, "ignoring protocol error");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Send a command by method name. Allocates the next id, registers
    /// the pending call, writes the frame, and suspends until the
    /// dispatch loop resolves it.
    pub async fn send_raw(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CdpError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = CommandFrame {
            id,
            method,
            params: &params,
            session_id,
        };
        let payload = serde_json::to_vec(&frame)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // shutdown may have swept the map between the check above and
        // the insert; re-check so the entry cannot outlive the sweep
        // and strand this caller.
        if self.closed.load(Ordering::Acquire) {
            self.pending.remove(&id);
            return Err(CdpError::ConnectionClosed);
        }

        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = transport::write_frame(&mut *writer, &payload).await {
                self.pending.remove(&id);
                return Err(CdpError::Transport(err));
            }
        }

        let resp = rx.await.map_err(|_| CdpError::ConnectionClosed)?;
        if let Some(err) = resp.error {
            return Err(CdpError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        Ok(resp
            .result
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    /// Raw send in ignore-errors mode.
    pub async fn send_raw_lenient(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Option<Value>> {
        match self.send_raw(method, params, session_id).await {
            Ok(value) => Ok(Some(value)),
            Err(CdpError::Protocol { code, message }) => {
                tracing::debug!(%method, code, %message, "ignoring protocol error");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // Handlers ------------------------------------------------------------------

    /// Register a connection-level handler for events carrying no
    /// session id.
    pub fn on(&self, method: impl Into<String>, callback: EventCallback) {
        self.handlers.entry(method.into()).or_default().push(callback);
    }

    pub fn clear_handlers(&self) {
        self.handlers.clear();
    }

    // Dispatch ------------------------------------------------------------------

    async fn dispatch_loop<R>(self: Arc<Self>, mut reader: R, registry: Arc<TargetRegistry>)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::with_capacity(16 * 1024);
        loop {
            match transport::read_frame(&mut reader, &mut buf).await {
                Ok(Some(frame)) => {
                    if let Ok(mut cursor) = self.cursor.lock() {
                        *cursor = Instant::now();
                    }
                    match serde_json::from_slice::<InboundFrame>(frame) {
                        Ok(msg) => self.dispatch(msg, &registry),
                        Err(err) => {
                            tracing::error!(%err, "JSON parse error on inbound frame");
                        }
                    }
                }
                Ok(None) => {
                    tracing::debug!("pipe closed by browser");
                    break;
                }
                Err(err) => {
                    tracing::error!(%err, "pipe read failed");
                    break;
                }
            }
        }
        self.shutdown();
    }

    fn dispatch(self: &Arc<Self>, msg: InboundFrame, registry: &Arc<TargetRegistry>) {
        // Presence of an id makes it a response; correlate by id, not
        // arrival order. An unknown id is a duplicate or late frame.
        if let Some(id) = msg.id {
            match self.pending.remove(&id) {
                Some((_, tx)) => {
                    let _ = tx.send(ResponsePayload {
                        result: msg.result,
                        error: msg.error,
                    });
                }
                None => tracing::warn!(id, "response for unknown command id"),
            }
            return;
        }

        let Some(method) = msg.method else {
            tracing::warn!("frame with neither id nor method");
            return;
        };
        let params = msg.params.unwrap_or(Value::Null);
        let event = match decode_event(&method, params) {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(%method, %err, "could not decode event, ignoring");
                return;
            }
        };

        match msg.session_id {
            Some(session_id) => {
                if let Some(tab) = registry.tab_for_session(&session_id) {
                    if event.is_dom_mutation() {
                        tab.invalidate_document();
                    }
                    tab.dispatch_event(&event);
                }
            }
            None => {
                registry.handle_event(self, &event);
                self.dispatch_connection_event(&event);
            }
        }
    }

    fn dispatch_connection_event(&self, event: &CdpEvent) {
        let callbacks: Vec<EventCallback> = match self.handlers.get(event.method()) {
            Some(entry) => entry.value().clone(),
            None => return,
        };
        for callback in callbacks {
            callback(event);
        }
    }

    // Lifecycle -----------------------------------------------------------------

    /// Fail every outstanding call exactly once and refuse new sends.
    pub(crate) fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let ids: Vec<CommandId> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            // Dropping the sender resolves the caller with a
            // connection-closed error.
            self.pending.remove(&id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// How long the pipe has been silent.
    pub(crate) fn idle_for(&self) -> Duration {
        self.cursor
            .lock()
            .map(|cursor| cursor.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}
