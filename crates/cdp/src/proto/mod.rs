//! Protocol stubs for the DevTools wire format.
//!
//! This module is the codec seam the rest of the crate talks through:
//! commands are plain serde structs implementing [`Command`], and inbound
//! events decode through [`decode_event`] into a typed [`CdpEvent`]. Only
//! the methods this driver issues are stubbed; everything else passes
//! through as a raw `Other` event. A generated schema could replace this
//! module without touching the client.

pub mod browser;
pub mod dom;
pub mod input;
pub mod page;
pub mod runtime;
pub mod target;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection-scoped command id. Strictly increasing, unique while
/// outstanding.
pub type CommandId = u64;

pub type TargetId = String;
pub type SessionId = String;

/// A typed protocol command: its wire method name and response shape.
pub trait Command: Serialize + Send + Sync {
    const METHOD: &'static str;
    type Response: DeserializeOwned + Send;
}

/// Error object carried inside a response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response with no interesting payload.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Empty {}

/// Outbound command envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommandFrame<'a> {
    pub id: CommandId,
    pub method: &'a str,
    pub params: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

/// Inbound frame before classification. Presence of `id` makes it a
/// response; otherwise it is an event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InboundFrame {
    #[serde(default)]
    pub id: Option<CommandId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

/// Events the core consumes, decoded; everything else raw.
#[derive(Debug, Clone)]
pub enum CdpEvent {
    TargetCreated(target::TargetCreated),
    TargetDestroyed(target::TargetDestroyed),
    AttachedToTarget(target::AttachedToTarget),
    DetachedFromTarget(target::DetachedFromTarget),
    TargetInfoChanged(target::TargetInfoChanged),
    LoadEventFired(page::LoadEventFired),
    DocumentUpdated,
    Other { method: String, params: Value },
}

/// Events that invalidate a tab's cached document tree.
const DOM_MUTATION_METHODS: &[&str] = &[
    "DOM.documentUpdated",
    "DOM.setChildNodes",
    "DOM.childNodeInserted",
    "DOM.childNodeRemoved",
    "DOM.childNodeCountUpdated",
    "DOM.attributeModified",
    "DOM.attributeRemoved",
    "DOM.characterDataModified",
];

impl CdpEvent {
    pub fn method(&self) -> &str {
        match self {
            CdpEvent::TargetCreated(_) => "Target.targetCreated",
            CdpEvent::TargetDestroyed(_) => "Target.targetDestroyed",
            CdpEvent::AttachedToTarget(_) => "Target.attachedToTarget",
            CdpEvent::DetachedFromTarget(_) => "Target.detachedFromTarget",
            CdpEvent::TargetInfoChanged(_) => "Target.targetInfoChanged",
            CdpEvent::LoadEventFired(_) => "Page.loadEventFired",
            CdpEvent::DocumentUpdated => "DOM.documentUpdated",
            CdpEvent::Other { method, .. } => method,
        }
    }

    pub fn is_dom_mutation(&self) -> bool {
        DOM_MUTATION_METHODS.contains(&self.method())
    }
}

/// Decode an inbound event frame into its typed form. Unknown methods
/// are passed through untyped rather than dropped.
pub fn decode_event(method: &str, params: Value) -> serde_json::Result<CdpEvent> {
    let event = match method {
        "Target.targetCreated" => CdpEvent::TargetCreated(serde_json::from_value(params)?),
        "Target.targetDestroyed" => CdpEvent::TargetDestroyed(serde_json::from_value(params)?),
        "Target.attachedToTarget" => CdpEvent::AttachedToTarget(serde_json::from_value(params)?),
        "Target.detachedFromTarget" => {
            CdpEvent::DetachedFromTarget(serde_json::from_value(params)?)
        }
        "Target.targetInfoChanged" => CdpEvent::TargetInfoChanged(serde_json::from_value(params)?),
        "Page.loadEventFired" => CdpEvent::LoadEventFired(serde_json::from_value(params)?),
        "DOM.documentUpdated" => CdpEvent::DocumentUpdated,
        _ => CdpEvent::Other {
            method: method.to_string(),
            params,
        },
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_frame_wire_shape() {
        let params = json!({"url": "about:blank"});
        let frame = CommandFrame {
            id: 7,
            method: "Page.navigate",
            params: &params,
            session_id: Some("S1"),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "method": "Page.navigate",
                "params": {"url": "about:blank"},
                "sessionId": "S1",
            })
        );
    }

    #[test]
    fn session_id_is_omitted_when_absent() {
        let params = json!({});
        let frame = CommandFrame {
            id: 1,
            method: "Browser.close",
            params: &params,
            session_id: None,
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(!text.contains("sessionId"));
    }

    #[test]
    fn decodes_known_events() {
        let event = decode_event(
            "Target.targetDestroyed",
            json!({"targetId": "T1"}),
        )
        .unwrap();
        match event {
            CdpEvent::TargetDestroyed(e) => assert_eq!(e.target_id, "T1"),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn unknown_events_pass_through_raw() {
        let event = decode_event("Network.requestWillBeSent", json!({"requestId": "r"})).unwrap();
        match &event {
            CdpEvent::Other { method, params } => {
                assert_eq!(method, "Network.requestWillBeSent");
                assert_eq!(params["requestId"], "r");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
        assert!(!event.is_dom_mutation());
    }

    #[test]
    fn mutation_classification() {
        let updated = decode_event("DOM.documentUpdated", Value::Null).unwrap();
        assert!(updated.is_dom_mutation());

        let inserted = decode_event("DOM.childNodeInserted", json!({})).unwrap();
        assert!(inserted.is_dom_mutation());

        let load = decode_event("Page.loadEventFired", json!({"timestamp": 1.0})).unwrap();
        assert!(!load.is_dom_mutation());
    }
}
