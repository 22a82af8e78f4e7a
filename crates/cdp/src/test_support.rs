//! Scripted fake browser for tests: the other end of the pipe.
//!
//! Tests drive the real client, registry, and tab machinery over an
//! in-memory duplex stream, playing the browser's role frame by frame.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use crate::client::CdpClient;
use crate::registry::TargetRegistry;
use crate::transport;

pub(crate) struct FakeBrowser {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    buf: Vec<u8>,
}

impl FakeBrowser {
    /// Next command frame written by the client. Panics on EOF; tests
    /// script every exchange they expect.
    pub(crate) async fn next_command(&mut self) -> Value {
        let frame = transport::read_frame(&mut self.reader, &mut self.buf)
            .await
            .unwrap()
            .expect("client closed the pipe while a command was expected");
        serde_json::from_slice(frame).unwrap()
    }

    pub(crate) async fn send_frame(&mut self, frame: &Value) {
        let payload = serde_json::to_vec(frame).unwrap();
        transport::write_frame(&mut self.writer, &payload)
            .await
            .unwrap();
    }

    pub(crate) async fn respond(&mut self, id: u64, result: Value) {
        self.send_frame(&json!({"id": id, "result": result})).await;
    }

    pub(crate) async fn respond_error(&mut self, id: u64, code: i64, message: &str) {
        self.send_frame(&json!({
            "id": id,
            "error": {"code": code, "message": message},
        }))
        .await;
    }

    pub(crate) async fn event(&mut self, method: &str, params: Value, session: Option<&str>) {
        let mut frame = json!({"method": method, "params": params});
        if let Some(session) = session {
            frame["sessionId"] = json!(session);
        }
        self.send_frame(&frame).await;
    }

    /// Announce a target and immediately attach to it, the sequence a
    /// real browser produces under auto-attach.
    pub(crate) async fn attach_target(&mut self, target_id: &str, session_id: &str, kind: &str) {
        let info = target_info(target_id, kind);
        self.event("Target.targetCreated", json!({"targetInfo": info}), None)
            .await;
        self.event(
            "Target.attachedToTarget",
            json!({
                "sessionId": session_id,
                "targetInfo": info,
                "waitingForDebugger": false,
            }),
            None,
        )
        .await;
    }
}

pub(crate) fn target_info(target_id: &str, kind: &str) -> Value {
    json!({
        "targetId": target_id,
        "type": kind,
        "title": "",
        "url": "about:blank",
        "attached": false,
    })
}

pub(crate) struct Rig {
    pub(crate) client: Arc<CdpClient>,
    pub(crate) registry: Arc<TargetRegistry>,
    pub(crate) fake: FakeBrowser,
    pub(crate) recv_task: JoinHandle<()>,
}

/// Client and registry wired to a scripted browser over an in-memory
/// pipe. With `auto_attach` off the registry issues no commands of its
/// own, which keeps single-exchange tests deterministic.
pub(crate) fn rig(auto_attach: bool) -> Rig {
    let (client_end, fake_end) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_end);
    let (fake_read, fake_write) = tokio::io::split(fake_end);

    let registry = TargetRegistry::new(auto_attach, vec!["Page".into(), "DOM".into()]);
    let (client, recv_task) = CdpClient::start(client_read, client_write, registry.clone());

    Rig {
        client,
        registry,
        fake: FakeBrowser {
            reader: BufReader::new(fake_read),
            writer: fake_write,
            buf: Vec::with_capacity(4096),
        },
        recv_task,
    }
}
