use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use crate::channel::protocol::{self, Command, InboundMessage};
use crate::channel::ChannelState;
use crate::config::BridgeConfig;
use crate::registry::TargetRegistry;
use crate::types::TriggerEvent;

/// Reconnecting WebSocket client for the control channel.
///
/// Owns the connection lifecycle: connects, serves traffic until an I/O
/// error or server close, then retries after a fixed backoff, forever.
/// Only the shutdown signal ends the loop. Inbound messages mutate the
/// shared target registry; outbound trigger events arrive over a bounded
/// channel from the tracking loop and are sent best-effort.
pub struct MessageChannel {
    endpoint: String,
    reconnect_interval: Duration,
    registry: Arc<TargetRegistry>,
    outbound: mpsc::Receiver<TriggerEvent>,
    shutdown: watch::Receiver<bool>,
    state: Arc<Mutex<ChannelState>>,
}

impl MessageChannel {
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<TargetRegistry>,
        outbound: mpsc::Receiver<TriggerEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            endpoint: config.endpoint_uri.clone(),
            reconnect_interval: config.reconnect_interval(),
            registry,
            outbound,
            shutdown,
            state: Arc::new(Mutex::new(ChannelState::Disconnected)),
        }
    }

    /// Shared handle for observing the connection state.
    pub fn state_handle(&self) -> Arc<Mutex<ChannelState>> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Drive the connection state machine until shutdown.
    pub async fn run(mut self) {
        loop {
            if self.shutdown_requested() {
                break;
            }

            self.set_state(ChannelState::Connecting);
            match connect_async(self.endpoint.as_str()).await {
                Ok((ws, _)) => {
                    info!(endpoint = %self.endpoint, "control channel connected");
                    self.set_state(ChannelState::Connected);
                    self.serve(ws).await;
                    info!("control channel connection closed");
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, "control channel connect failed: {e}");
                }
            }
            self.set_state(ChannelState::Disconnected);

            if self.shutdown_requested() {
                break;
            }
            debug!(
                "retrying control channel in {:.1}s",
                self.reconnect_interval.as_secs_f64()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_interval) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || self.shutdown_requested() {
                        break;
                    }
                }
            }
        }

        self.set_state(ChannelState::ShutDown);
        info!("control channel shut down");
    }

    /// Serve one established connection until it fails, the server closes
    /// it, or shutdown is requested.
    async fn serve<S>(&mut self, ws: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();
        // When the tracking loop hangs up its sender, recv() would resolve
        // to None forever; disarm that select branch instead of spinning.
        let mut outbound_open = true;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            for response in handle_inbound(&text, &self.registry) {
                                if let Err(e) = sink.send(Message::Text(response)).await {
                                    warn!("control channel send failed: {e}");
                                    return;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return,
                        Some(Ok(_)) => {} // binary / pong frames are ignored
                        Some(Err(e)) => {
                            warn!("control channel receive failed: {e}");
                            return;
                        }
                    }
                }
                event = self.outbound.recv(), if outbound_open => {
                    match event {
                        Some(event) => {
                            let encoded = protocol::encode_trigger(&event);
                            if let Err(e) = sink.send(Message::Text(encoded)).await {
                                // No retry queue: the marker can re-trigger
                                // after a reset, so loss is tolerable
                                warn!(
                                    marker = %event.marker_id,
                                    "dropping trigger confirmation, send failed: {e}"
                                );
                                return;
                            }
                            debug!(marker = %event.marker_id, "trigger confirmation sent");
                        }
                        None => outbound_open = false,
                    }
                }
            }
        }
    }
}

/// Decode and apply one inbound payload to the registry. Returns any
/// responses owed to the server. Malformed input is logged and dropped;
/// the connection stays open.
fn handle_inbound(text: &str, registry: &TargetRegistry) -> Vec<String> {
    match protocol::parse_inbound(text) {
        Ok(InboundMessage::Set { aruco_id, data }) => {
            registry.set(aruco_id, data);
            info!(marker = %aruco_id, targets = registry.len(), "target registered");
            vec![protocol::encode_ready_ack(aruco_id)]
        }
        Ok(InboundMessage::SetBatch { aruco_ids, data }) => {
            registry.set_many(&aruco_ids, &data);
            info!(count = aruco_ids.len(), targets = registry.len(), "targets registered");
            vec![]
        }
        Ok(InboundMessage::Command {
            command: Command::Reset,
            ..
        }) => {
            registry.reset();
            info!("target registry cleared");
            vec![]
        }
        Ok(InboundMessage::Command {
            command: Command::Clear,
            aruco_id: Some(id),
        }) => {
            if registry.clear(id) {
                info!(marker = %id, "target cleared");
            }
            vec![]
        }
        Ok(InboundMessage::Command {
            command: Command::Clear,
            aruco_id: None,
        }) => {
            warn!("dropping clear command without aruco_id");
            vec![]
        }
        Err(e) => {
            warn!("dropping malformed inbound message: {e}");
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarkerId;
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::accept_async;

    // --- handle_inbound (no sockets involved) ---

    #[test]
    fn set_message_updates_registry_and_acks() {
        let registry = TargetRegistry::new();
        let responses = handle_inbound(r#"{"aruco_id": 5, "data": "x"}"#, &registry);
        assert_eq!(registry.get(MarkerId::new(5)), Some(json!("x")));
        assert_eq!(responses.len(), 1);
        let ack: serde_json::Value = serde_json::from_str(&responses[0]).unwrap();
        assert_eq!(ack["data"]["status"], "ready");
    }

    #[test]
    fn batch_message_updates_registry_without_ack() {
        let registry = TargetRegistry::new();
        let responses = handle_inbound(r#"{"aruco_ids": [1, 2], "data": 7}"#, &registry);
        assert!(responses.is_empty());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(MarkerId::new(2)), Some(json!(7)));
    }

    #[test]
    fn reset_command_empties_registry() {
        let registry = TargetRegistry::new();
        registry.set(MarkerId::new(1), json!(null));
        handle_inbound(r#"{"command": "reset"}"#, &registry);
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_command_removes_one_target() {
        let registry = TargetRegistry::new();
        registry.set(MarkerId::new(1), json!(null));
        registry.set(MarkerId::new(2), json!(null));
        handle_inbound(r#"{"command": "clear", "aruco_id": 1}"#, &registry);
        assert!(!registry.contains(MarkerId::new(1)));
        assert!(registry.contains(MarkerId::new(2)));
    }

    #[test]
    fn clear_for_unknown_target_does_not_insert_it() {
        let registry = TargetRegistry::new();
        let responses = handle_inbound(r#"{"command": "clear", "aruco_id": 7}"#, &registry);
        assert!(responses.is_empty());
        assert!(registry.is_empty(), "clear must never upsert");
    }

    #[test]
    fn malformed_message_is_dropped_without_registry_change() {
        let registry = TargetRegistry::new();
        registry.set(MarkerId::new(1), json!(null));
        assert!(handle_inbound("garbage", &registry).is_empty());
        assert!(handle_inbound(r#"{"command": "explode"}"#, &registry).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clear_without_id_is_dropped() {
        let registry = TargetRegistry::new();
        registry.set(MarkerId::new(1), json!(null));
        handle_inbound(r#"{"command": "clear"}"#, &registry);
        assert_eq!(registry.len(), 1);
    }

    // --- connection lifecycle (in-process server) ---

    struct Harness {
        registry: Arc<TargetRegistry>,
        outbound_tx: mpsc::Sender<TriggerEvent>,
        shutdown_tx: watch::Sender<bool>,
        state: Arc<Mutex<ChannelState>>,
        task: tokio::task::JoinHandle<()>,
    }

    /// Start a channel pointed at `addr` with a fast reconnect interval.
    fn start_channel(addr: SocketAddr) -> Harness {
        let config = BridgeConfig {
            endpoint_uri: format!("ws://{addr}/"),
            reconnect_interval: 0.05,
            ..Default::default()
        };
        let registry = Arc::new(TargetRegistry::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let channel =
            MessageChannel::new(&config, Arc::clone(&registry), outbound_rx, shutdown_rx);
        let state = channel.state_handle();
        let task = tokio::spawn(channel.run());
        Harness {
            registry,
            outbound_tx,
            shutdown_tx,
            state,
            task,
        }
    }

    async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for: {description}"));
    }

    async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.expect("accept should succeed");
        accept_async(stream).await.expect("handshake should succeed")
    }

    #[tokio::test]
    async fn connects_applies_set_and_acks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let harness = start_channel(addr);

        let mut server = accept_ws(&listener).await;
        wait_until("channel connected", || {
            *harness.state.lock() == ChannelState::Connected
        })
        .await;

        server
            .send(Message::Text(r#"{"aruco_id": 5, "data": "x"}"#.into()))
            .await
            .unwrap();

        // The ready acknowledgement comes back over the same connection
        let ack = tokio::time::timeout(Duration::from_secs(5), server.next())
            .await
            .expect("ack should arrive")
            .unwrap()
            .unwrap();
        let ack: serde_json::Value = serde_json::from_str(ack.to_text().unwrap()).unwrap();
        assert_eq!(ack["id"], 5);
        assert_eq!(ack["data"]["status"], "ready");
        assert_eq!(harness.registry.get(MarkerId::new(5)), Some(json!("x")));

        harness.shutdown_tx.send(true).unwrap();
        harness.task.await.unwrap();
        assert_eq!(*harness.state.lock(), ChannelState::ShutDown);
    }

    #[tokio::test]
    async fn forwards_trigger_events_to_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let harness = start_channel(addr);

        let mut server = accept_ws(&listener).await;
        wait_until("channel connected", || {
            *harness.state.lock() == ChannelState::Connected
        })
        .await;

        harness
            .outbound_tx
            .send(TriggerEvent {
                marker_id: MarkerId::new(5),
                payload: json!("x"),
                timestamp: 99.5,
            })
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), server.next())
            .await
            .expect("trigger should arrive")
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        assert_eq!(value["event"], "marker_triggered");
        assert_eq!(value["marker_id"], 5);
        assert_eq!(value["data"], "x");

        harness.shutdown_tx.send(true).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_connection_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let harness = start_channel(addr);

        // First connection: accept, then drop it immediately
        let server = accept_ws(&listener).await;
        drop(server);

        wait_until("channel noticed the drop", || {
            *harness.state.lock() != ChannelState::Connected
        })
        .await;

        // Second connection proves the retry loop ran
        let mut server = accept_ws(&listener).await;
        wait_until("channel reconnected", || {
            *harness.state.lock() == ChannelState::Connected
        })
        .await;

        // Registry updates still work after the reconnect
        server
            .send(Message::Text(r#"{"aruco_id": 9, "data": null}"#.into()))
            .await
            .unwrap();
        wait_until("registry updated", || harness.registry.contains(MarkerId::new(9))).await;

        harness.shutdown_tx.send(true).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test]
    async fn retries_while_server_is_down_then_connects() {
        // Reserve an address, then close the listener so connects fail
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let harness = start_channel(addr);
        // A few retry cycles while nothing is listening
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_ne!(*harness.state.lock(), ChannelState::Connected);
        assert_ne!(*harness.state.lock(), ChannelState::ShutDown);

        // Server comes up on the same address; channel finds it
        let listener = TcpListener::bind(addr).await.unwrap();
        let _server = accept_ws(&listener).await;
        wait_until("channel connected", || {
            *harness.state.lock() == ChannelState::Connected
        })
        .await;

        harness.shutdown_tx.send(true).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_while_disconnected_is_terminal() {
        // Nothing listening: the channel cycles Connecting/Disconnected
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let harness = start_channel(addr);
        tokio::time::sleep(Duration::from_millis(60)).await;

        harness.shutdown_tx.send(true).unwrap();
        harness.task.await.unwrap();
        assert_eq!(*harness.state.lock(), ChannelState::ShutDown);
    }

    #[tokio::test]
    async fn malformed_message_does_not_close_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let harness = start_channel(addr);

        let mut server = accept_ws(&listener).await;
        wait_until("channel connected", || {
            *harness.state.lock() == ChannelState::Connected
        })
        .await;

        server
            .send(Message::Text("definitely not json".into()))
            .await
            .unwrap();
        // A valid message afterwards still lands — the connection survived
        server
            .send(Message::Text(r#"{"aruco_id": 3, "data": 1}"#.into()))
            .await
            .unwrap();
        wait_until("registry updated", || harness.registry.contains(MarkerId::new(3))).await;
        assert_eq!(*harness.state.lock(), ChannelState::Connected);

        harness.shutdown_tx.send(true).unwrap();
        harness.task.await.unwrap();
    }
}
