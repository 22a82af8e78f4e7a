//! Target registry: the connection-level lifecycle state machine.
//!
//! Every `Target.*` lifecycle event lands here, in wire order, from the
//! dispatch loop. The registry keeps one [`Tab`] per target id for the
//! whole time the browser knows the target; sessions come and go on top
//! of that identity. Handlers are synchronous so state transitions
//! apply in event order; anything that talks back to the browser is
//! spawned off.

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::CdpClient;
use crate::proto::target::{AttachToTarget, TargetInfo, CONTROLLABLE_KINDS};
use crate::proto::{CdpEvent, SessionId, TargetId};
use crate::tab::Tab;

pub struct TargetRegistry {
    targets: DashMap<TargetId, Arc<Tab>>,
    sessions: DashMap<SessionId, Arc<Tab>>,
    auto_attach: bool,
    auto_enable_domains: Vec<String>,
}

impl TargetRegistry {
    pub fn new(auto_attach: bool, auto_enable_domains: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            targets: DashMap::new(),
            sessions: DashMap::new(),
            auto_attach,
            auto_enable_domains,
        })
    }

    // Lookup ------------------------------------------------------------------

    pub fn tab(&self, target_id: &str) -> Option<Arc<Tab>> {
        self.targets.get(target_id).map(|e| e.value().clone())
    }

    pub fn tab_for_session(&self, session_id: &str) -> Option<Arc<Tab>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    pub fn tabs(&self) -> Vec<Arc<Tab>> {
        self.targets.iter().map(|e| e.value().clone()).collect()
    }

    /// Tab owning the given frame id. A target's own frame id matches
    /// its target id for top-level pages, or the last main-frame id it
    /// reported while navigating.
    pub fn frame_owner(&self, frame_id: &str) -> Option<Arc<Tab>> {
        if let Some(tab) = self.tab(frame_id) {
            return Some(tab);
        }
        self.targets
            .iter()
            .find(|e| e.value().last_frame_id().as_deref() == Some(frame_id))
            .map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub(crate) fn clear(&self) {
        self.sessions.clear();
        self.targets.clear();
    }

    // Lifecycle ---------------------------------------------------------------

    /// Apply one connection-level event. Runs on the dispatch loop, so
    /// transitions are observed in the order the browser emitted them.
    pub(crate) fn handle_event(self: &Arc<Self>, client: &Arc<CdpClient>, event: &CdpEvent) {
        match event {
            CdpEvent::TargetCreated(e) => self.on_created(client, &e.target_info),
            CdpEvent::AttachedToTarget(e) => {
                self.on_attached(client, &e.session_id, &e.target_info)
            }
            CdpEvent::DetachedFromTarget(e) => self.on_detached(&e.session_id),
            CdpEvent::TargetDestroyed(e) => self.on_destroyed(&e.target_id),
            CdpEvent::TargetInfoChanged(e) => self.on_info_changed(&e.target_info),
            _ => {}
        }
    }

    fn on_created(self: &Arc<Self>, client: &Arc<CdpClient>, info: &TargetInfo) {
        if !CONTROLLABLE_KINDS.contains(&info.kind.as_str()) {
            tracing::debug!(target = %info.target_id, kind = %info.kind, "ignoring target");
            return;
        }
        // Re-announcement of a known target only refreshes metadata.
        let tab = self.ensure_tab(client, info);
        tab.update_info(info.clone());

        if self.auto_attach && !info.attached {
            let client = client.clone();
            let target_id = info.target_id.clone();
            tokio::spawn(async move {
                // Attachment confirmation arrives as an event; a failure
                // here means the target vanished first.
                let cmd = AttachToTarget {
                    target_id: target_id.clone(),
                    flatten: true,
                };
                if let Err(err) = client.send_lenient(&cmd, None).await {
                    tracing::debug!(target = %target_id, %err, "attach failed");
                }
            });
        }
    }

    fn on_attached(self: &Arc<Self>, client: &Arc<CdpClient>, session_id: &str, info: &TargetInfo) {
        let tab = self.ensure_tab(client, info);
        tab.update_info(info.clone());
        tab.bind_session(session_id.to_string());
        self.sessions.insert(session_id.to_string(), tab.clone());
        tracing::debug!(target = %info.target_id, session = %session_id, "session attached");

        if self.auto_attach && matches!(info.kind.as_str(), "page" | "iframe") {
            let client = client.clone();
            let session = session_id.to_string();
            let domains = self.auto_enable_domains.clone();
            tokio::spawn(async move {
                let enables = domains.into_iter().map(|domain| {
                    let client = client.clone();
                    let session = session.clone();
                    async move {
                        let method = format!("{domain}.enable");
                        if let Err(err) = client
                            .send_raw_lenient(&method, serde_json::json!({}), Some(&session))
                            .await
                        {
                            tracing::debug!(%method, %err, "domain enable failed");
                        }
                    }
                });
                futures_util::future::join_all(enables).await;
            });
        }
    }

    fn on_detached(&self, session_id: &str) {
        // Detach clears the session but the tab identity survives; the
        // browser may re-attach the same target later.
        match self.sessions.remove(session_id) {
            Some((_, tab)) => {
                tab.clear_session();
                tracing::debug!(target = %tab.target_id(), session = %session_id, "session detached");
            }
            None => tracing::debug!(session = %session_id, "detach for unknown session"),
        }
    }

    fn on_destroyed(&self, target_id: &str) {
        match self.targets.remove(target_id) {
            Some((_, tab)) => {
                if let Some(session_id) = tab.session_id() {
                    self.sessions.remove(&session_id);
                }
                tab.clear_session();
                tracing::debug!(target = %target_id, "target destroyed");
            }
            // Destruction of an unknown target is not an error.
            None => tracing::debug!(target = %target_id, "destroy for unknown target"),
        }
    }

    fn on_info_changed(&self, info: &TargetInfo) {
        if let Some(tab) = self.tab(&info.target_id) {
            tab.update_info(info.clone());
        }
    }

    /// One `Tab` per target id for the target's lifetime. Concurrent
    /// callers for the same id always observe the same instance.
    fn ensure_tab(self: &Arc<Self>, client: &Arc<CdpClient>, info: &TargetInfo) -> Arc<Tab> {
        self.targets
            .entry(info.target_id.clone())
            .or_insert_with(|| Tab::new(client.clone(), Arc::downgrade(self), info.clone()))
            .value()
            .clone()
    }
}
