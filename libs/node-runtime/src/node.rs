use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use log_api::{RequestHandler, RpcError};

use crate::error::RuntimeError;
use crate::message::{set_field, Message};

/// Identity assigned by the harness in the `init` handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub node_id: String,
    pub node_ids: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════
//  Node
// ═══════════════════════════════════════════════════════════════

/// One process in the cluster: owns the outbound message stream, the
/// message id counter and the table of RPCs awaiting a reply.
pub struct Node {
    identity: OnceLock<Identity>,
    next_msg_id: AtomicU64,
    outbound: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl Node {
    /// Create a node plus the receiving end of its outbound stream, to be
    /// drained by [`write_outbound`].
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Arc::new(Self {
            identity: OnceLock::new(),
            next_msg_id: AtomicU64::new(1),
            outbound: tx,
            pending: Mutex::new(HashMap::new()),
        });
        (node, rx)
    }

    /// This node's id, once `init` has been received.
    pub fn id(&self) -> Option<&str> {
        self.identity.get().map(|i| i.node_id.as_str())
    }

    /// Every node id in the cluster (empty before `init`).
    pub fn node_ids(&self) -> &[String] {
        self.identity.get().map(|i| i.node_ids.as_slice()).unwrap_or_default()
    }

    /// Send a fire-and-forget message.
    pub fn send(&self, dest: &str, body: Value) -> Result<(), RuntimeError> {
        let msg = Message::new(self.id().unwrap_or_default(), dest, body);
        self.outbound.send(msg).map_err(|_| RuntimeError::Closed)
    }

    /// Reply to `request`, correlating via `in_reply_to`.
    pub fn reply(&self, request: &Message, mut body: Value) -> Result<(), RuntimeError> {
        if let Some(id) = request.msg_id() {
            set_field(&mut body, "in_reply_to", json!(id));
        }
        set_field(&mut body, "msg_id", json!(self.next_id()));
        self.send(&request.src, body)
    }

    /// Send a request and wait for its reply body.
    ///
    /// Error replies come back as `RuntimeError::Rpc`. On timeout the
    /// pending entry is dropped and a late reply is discarded.
    pub async fn rpc(&self, dest: &str, mut body: Value, timeout: Duration) -> Result<Value, RuntimeError> {
        let msg_id = self.next_id();
        set_field(&mut body, "msg_id", json!(msg_id));

        let (tx, rx) = oneshot::channel();
        self.pending().insert(msg_id, tx);
        // Clears the entry however this future ends, including when the
        // caller drops it mid-wait.
        let _pending = PendingGuard { node: self, msg_id };
        self.send(dest, body)?;

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(RuntimeError::Closed),
            Err(_) => return Err(RuntimeError::Timeout { dest: dest.to_string(), msg_id }),
        };
        match RpcError::from_body(&reply) {
            Some(err) => Err(RuntimeError::Rpc(err)),
            None => Ok(reply),
        }
    }

    /// Route a reply to the RPC waiting for it. Returns `false` if nobody
    /// is waiting (timed out, or never sent).
    pub fn complete(&self, reply: Message) -> bool {
        let Some(id) = reply.in_reply_to() else {
            return false;
        };
        let waiter = self.pending().remove(&id);
        match waiter {
            Some(tx) => tx.send(reply.body).is_ok(),
            None => {
                tracing::debug!(in_reply_to = id, src = %reply.src, "dropping reply with no pending rpc");
                false
            }
        }
    }

    /// Read messages from `input` until EOF or `shutdown`, dispatching each
    /// client request to `handler` on its own task.
    pub async fn run<R>(
        self: &Arc<Self>,
        input: R,
        handler: Arc<dyn RequestHandler>,
        shutdown: CancellationToken,
    ) -> Result<(), RuntimeError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, no longer reading input");
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        tracing::info!("input closed");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Message>(&line) {
                        Ok(msg) => self.dispatch(msg, &handler, &mut tasks),
                        Err(e) => tracing::warn!(error = %e, "skipping undecodable line"),
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "request task panicked");
                    }
                }
            }
        }

        let in_flight = tasks.len();
        if in_flight > 0 {
            tracing::info!(in_flight, "draining in-flight requests");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "request task panicked");
            }
        }
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, msg: Message, handler: &Arc<dyn RequestHandler>, tasks: &mut JoinSet<()>) {
        if msg.in_reply_to().is_some() {
            self.complete(msg);
            return;
        }
        if msg.kind() == "init" {
            self.handle_init(&msg);
            return;
        }

        let node = self.clone();
        let handler = handler.clone();
        tasks.spawn(async move {
            let body = match handler.handle(msg.body.clone()).await {
                Ok(body) => body,
                Err(e) => {
                    if e.code().is_definite() {
                        tracing::debug!(src = %msg.src, kind = msg.kind(), error = %e, "replying with error");
                    } else {
                        tracing::warn!(src = %msg.src, kind = msg.kind(), error = %e, "replying with indefinite error");
                    }
                    e.to_body()
                }
            };
            if let Err(e) = node.reply(&msg, body) {
                tracing::warn!(error = %e, "failed to send reply");
            }
        });
    }

    fn handle_init(&self, msg: &Message) {
        let node_id = msg.body.get("node_id").and_then(Value::as_str);
        let node_ids = msg.body.get("node_ids").and_then(Value::as_array);
        let (Some(node_id), Some(node_ids)) = (node_id, node_ids) else {
            let err = RpcError::malformed("init requires node_id and node_ids");
            if let Err(e) = self.reply(msg, err.to_body()) {
                tracing::warn!(error = %e, "failed to send reply");
            }
            return;
        };

        let identity = Identity {
            node_id: node_id.to_string(),
            node_ids: node_ids.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        };
        match self.identity.set(identity) {
            Ok(()) => tracing::info!(node_id, peers = node_ids.len(), "node initialized"),
            Err(_) => tracing::warn!(node_id, "duplicate init ignored"),
        }
        if let Err(e) = self.reply(msg, json!({"type": "init_ok"})) {
            tracing::warn!(error = %e, "failed to send reply");
        }
    }

    fn next_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Value>>> {
        match self.pending.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("pending rpc table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Removes an RPC's pending entry when the waiting future goes away.
struct PendingGuard<'a> {
    node: &'a Node,
    msg_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.node.pending().remove(&self.msg_id);
    }
}

/// Serialize outbound messages to `writer`, one JSON object per line,
/// until every sender is dropped.
pub async fn write_outbound<W>(mut rx: mpsc::UnboundedReceiver<Message>, mut writer: W) -> Result<(), RuntimeError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let mut line = serde_json::to_vec(&msg)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use super::*;

    /// Echoes `{"type": "echo", "echo": x}` and rejects anything else.
    struct Echo;

    impl RequestHandler for Echo {
        fn handle(&self, body: Value) -> Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send + '_>> {
            Box::pin(async move {
                if body["type"] == "echo" {
                    Ok(json!({"type": "echo_ok", "echo": body["echo"]}))
                } else if body["type"] == "crash" {
                    Err(RpcError::crash("backend gone"))
                } else {
                    Err(RpcError::not_supported("only echo"))
                }
            })
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn init_then_request_replies_in_order() {
        let input = concat!(
            r#"{"src":"c0","dest":"n1","body":{"type":"init","msg_id":1,"node_id":"n1","node_ids":["n1","n2"]}}"#,
            "\n",
            "not json\n",
            r#"{"src":"c1","dest":"n1","body":{"type":"echo","msg_id":2,"echo":"hi"}}"#,
            "\n",
            r#"{"src":"c1","dest":"n1","body":{"type":"txn","msg_id":3}}"#,
            "\n",
        );
        let (node, mut rx) = Node::new();
        node.run(input.as_bytes(), Arc::new(Echo), CancellationToken::new()).await.unwrap();

        assert_eq!(node.id(), Some("n1"));
        assert_eq!(node.node_ids(), ["n1".to_string(), "n2".to_string()]);

        let out = drain(&mut rx);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind(), "init_ok");
        assert_eq!(out[0].in_reply_to(), Some(1));

        let echo = out.iter().find(|m| m.in_reply_to() == Some(2)).unwrap();
        assert_eq!(echo.src, "n1");
        assert_eq!(echo.dest, "c1");
        assert_eq!(echo.body["echo"], "hi");

        let err = out.iter().find(|m| m.in_reply_to() == Some(3)).unwrap();
        assert_eq!(err.kind(), "error");
        assert_eq!(err.body["code"], 10);
    }

    #[tokio::test]
    async fn indefinite_handler_error_is_replied_with_its_code() {
        let input = concat!(
            r#"{"src":"c1","dest":"n1","body":{"type":"crash","msg_id":9}}"#,
            "\n",
        );
        let (node, mut rx) = Node::new();
        node.run(input.as_bytes(), Arc::new(Echo), CancellationToken::new()).await.unwrap();

        let out = drain(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].in_reply_to(), Some(9));
        assert_eq!(out[0].body["code"], 13);
        assert!(!log_api::ErrorCode::Crash.is_definite());
    }

    #[tokio::test]
    async fn rpc_reply_is_routed_to_caller() {
        let (node, mut rx) = Node::new();
        let caller = node.clone();
        let call = tokio::spawn(async move {
            caller.rpc("lin-kv", json!({"type": "read", "key": "k"}), Duration::from_secs(5)).await
        });

        let request = rx.recv().await.unwrap();
        assert_eq!(request.dest, "lin-kv");
        let id = request.msg_id().unwrap();
        let reply = Message::new("lin-kv", "n1", json!({"type": "read_ok", "value": 3, "in_reply_to": id}));
        assert!(node.complete(reply));

        let body = call.await.unwrap().unwrap();
        assert_eq!(body["value"], 3);
    }

    #[tokio::test]
    async fn rpc_error_reply_becomes_rpc_error() {
        let (node, mut rx) = Node::new();
        let caller = node.clone();
        let call = tokio::spawn(async move {
            caller.rpc("lin-kv", json!({"type": "read", "key": "k"}), Duration::from_secs(5)).await
        });

        let id = rx.recv().await.unwrap().msg_id().unwrap();
        let reply = Message::new("lin-kv", "n1", json!({"type": "error", "code": 20, "text": "missing", "in_reply_to": id}));
        node.complete(reply);

        match call.await.unwrap() {
            Err(RuntimeError::Rpc(e)) => assert_eq!(e.code(), log_api::ErrorCode::KeyDoesNotExist),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rpc_times_out_and_late_reply_is_dropped() {
        let (node, mut rx) = Node::new();
        let result = node.rpc("lin-kv", json!({"type": "read", "key": "k"}), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(RuntimeError::Timeout { .. })));

        let id = rx.recv().await.unwrap().msg_id().unwrap();
        let late = Message::new("lin-kv", "n1", json!({"type": "read_ok", "value": 1, "in_reply_to": id}));
        assert!(!node.complete(late));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_rpc_releases_pending_entry() {
        let (node, mut rx) = Node::new();
        let call = node.rpc("lin-kv", json!({"type": "read", "key": "k"}), Duration::from_secs(1));
        assert!(tokio::time::timeout(Duration::from_millis(50), call).await.is_err());
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(node.pending().is_empty());
        let id = rx.recv().await.unwrap().msg_id().unwrap();
        let late = Message::new("lin-kv", "n1", json!({"type": "read_ok", "value": 1, "in_reply_to": id}));
        assert!(!node.complete(late));
    }

    #[tokio::test]
    async fn completed_rpc_leaves_no_pending_entry() {
        let (node, mut rx) = Node::new();
        let caller = node.clone();
        let call = tokio::spawn(async move {
            caller.rpc("lin-kv", json!({"type": "read", "key": "k"}), Duration::from_secs(5)).await
        });
        let id = rx.recv().await.unwrap().msg_id().unwrap();
        node.complete(Message::new("lin-kv", "n1", json!({"type": "read_ok", "value": 2, "in_reply_to": id})));
        call.await.unwrap().unwrap();
        assert!(node.pending().is_empty());
    }

    #[tokio::test]
    async fn outbound_is_newline_delimited_json() {
        let (node, rx) = Node::new();
        node.send("c1", json!({"type": "x"})).unwrap();
        drop(node);

        let mut buf = Vec::new();
        write_outbound(rx, &mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "{\"src\":\"\",\"dest\":\"c1\",\"body\":{\"type\":\"x\"}}\n");
    }
}
