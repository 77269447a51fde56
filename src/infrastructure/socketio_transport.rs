// Socket.IO transport - WebSocket connection to the device server's event channel
use crate::application::connection_manager::{ChannelStream, ChannelTransport, InboundEvent};
use crate::domain::error::ConnectionError;
use crate::infrastructure::socketio::{self, CONNECT_DEFAULT_NAMESPACE, Packet};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct SocketIoTransport {
    url: String,
}

impl SocketIoTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChannelTransport for SocketIoTransport {
    async fn connect(&self) -> Result<Box<dyn ChannelStream>, ConnectionError> {
        tracing::debug!("Connecting to {}", self.url);
        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;

        let liveness = handshake(&mut socket).await?;
        Ok(Box::new(SocketIoStream { socket, liveness }))
    }
}

/// Engine.IO open, then join the default namespace. Returns how long the
/// channel may stay silent before it counts as dead.
async fn handshake(socket: &mut Socket) -> Result<Duration, ConnectionError> {
    let mut liveness = socketio::DEFAULT_LIVENESS;

    loop {
        let text = next_text(socket, liveness)
            .await
            .ok_or_else(|| ConnectionError::Handshake("closed during handshake".to_string()))??;

        match socketio::decode(&text)? {
            Packet::Open(info) => {
                tracing::debug!("Engine.IO open: {}", info);
                liveness = socketio::liveness_window(&info);
                socket
                    .send(Message::Text(CONNECT_DEFAULT_NAMESPACE.to_string()))
                    .await
                    .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
            }
            Packet::Connect => return Ok(liveness),
            Packet::ConnectError(reason) => return Err(ConnectionError::Handshake(reason)),
            Packet::Ping(payload) => pong(socket, &payload).await?,
            Packet::Close | Packet::Disconnect => {
                return Err(ConnectionError::Handshake("server closed the session".to_string()));
            }
            other => tracing::debug!("Ignoring {:?} during handshake", other),
        }
    }
}

async fn pong(socket: &mut Socket, payload: &str) -> Result<(), ConnectionError> {
    socket
        .send(Message::Text(socketio::encode_pong(payload)))
        .await
        .map_err(|e| ConnectionError::Protocol(format!("pong failed: {}", e)))
}

/// Next text frame. `None` when the socket closed, `Timeout` when nothing
/// at all arrived within `liveness`.
async fn next_text(socket: &mut Socket, liveness: Duration) -> Option<Result<String, ConnectionError>> {
    loop {
        let frame = match tokio::time::timeout(liveness, socket.next()).await {
            Ok(frame) => frame?,
            Err(_) => return Some(Err(ConnectionError::Timeout(liveness))),
        };
        match frame {
            Ok(Message::Text(text)) => return Some(Ok(text)),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => return Some(Err(ConnectionError::Unreachable(e.to_string()))),
        }
    }
}

struct SocketIoStream {
    socket: Socket,
    liveness: Duration,
}

#[async_trait]
impl ChannelStream for SocketIoStream {
    async fn next_event(&mut self) -> Option<Result<InboundEvent, ConnectionError>> {
        loop {
            let text = match next_text(&mut self.socket, self.liveness).await? {
                Ok(text) => text,
                Err(error) => return Some(Err(error)),
            };

            let packet = match socketio::decode(&text) {
                Ok(packet) => packet,
                Err(error) => {
                    tracing::warn!("Skipping frame: {}", error);
                    continue;
                }
            };

            match packet {
                Packet::Event { name, data } => match socketio::decode_event(&name, data) {
                    Some(Ok(event)) => return Some(Ok(event)),
                    Some(Err(error)) => tracing::warn!("Rejected {} event: {}", name, error),
                    None => tracing::debug!("Ignoring {} event", name),
                },
                Packet::Ping(payload) => {
                    if let Err(error) = pong(&mut self.socket, &payload).await {
                        return Some(Err(error));
                    }
                }
                Packet::Close | Packet::Disconnect => return None,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal Socket.IO server: handshake, one ping, scripted frames, close.
    async fn spawn_server(frames: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/socket.io/?EIO=4&transport=websocket", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut received = Vec::new();

            ws.send(Message::Text(r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#.to_string()))
                .await
                .unwrap();
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                received.push(text);
            }
            ws.send(Message::Text(r#"40{"sid":"n1"}"#.to_string())).await.unwrap();

            ws.send(Message::Text("2".to_string())).await.unwrap();
            for frame in frames {
                ws.send(Message::Text(frame.to_string())).await.unwrap();
            }
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                received.push(text);
            }
            let _ = ws.close(None).await;
            received
        });

        (url, server)
    }

    #[tokio::test]
    async fn test_handshake_and_events() {
        let (url, server) = spawn_server(vec![
            r#"42["vial_update",{"vial":1,"od":"bad","temperature":37.0,"timestamp":"2024-03-01T12:00:00"}]"#,
            r#"42["experiment_log",{"line":"hello"}]"#,
            r#"42["vial_update",{"vial":1,"od":0.25,"temperature":37.0,"drug_concentration":null,"growth_rate":null,"timestamp":"2024-03-01T12:00:00"}]"#,
            r#"42["pump_status",{"pump":2,"active":true}]"#,
            "41",
        ])
        .await;

        let transport = SocketIoTransport::new(url);
        let mut stream = transport.connect().await.unwrap();

        let Some(Ok(InboundEvent::VialUpdate(sample))) = stream.next_event().await else {
            panic!("expected the well-formed vial update");
        };
        assert_eq!(sample.od, 0.25);

        let Some(Ok(InboundEvent::PumpStatus(status))) = stream.next_event().await else {
            panic!("expected pump status");
        };
        assert_eq!(status.pump, 2);
        assert!(stream.next_event().await.is_none());

        let received = server.await.unwrap();
        assert_eq!(received, vec!["40".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = SocketIoTransport::new(format!("ws://{}/socket.io/?EIO=4&transport=websocket", addr));
        assert!(matches!(
            transport.connect().await,
            Err(ConnectionError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/socket.io/?EIO=4&transport=websocket", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"0{"sid":"s1","pingInterval":100,"pingTimeout":100}"#.to_string()))
                .await
                .unwrap();
            let _ = ws.next().await;
            ws.send(Message::Text(r#"40{"sid":"n1"}"#.to_string())).await.unwrap();

            // Keep the socket open but never send another frame.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut stream = SocketIoTransport::new(url).connect().await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), stream.next_event())
            .await
            .expect("stream kept waiting on a silent server");
        assert!(matches!(
            outcome,
            Some(Err(ConnectionError::Timeout(window))) if window == Duration::from_millis(200)
        ));

        drop(stream);
        let _ = server.await;
    }

    #[tokio::test]
    async fn test_wss_url_negotiates_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Plain TCP peer that hangs up during the TLS handshake.
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let transport = SocketIoTransport::new(format!("wss://{}/socket.io/?EIO=4&transport=websocket", addr));
        let Err(ConnectionError::Unreachable(reason)) = transport.connect().await else {
            panic!("a plain TCP peer cannot complete a TLS handshake");
        };
        assert!(!reason.contains("TLS support not compiled in"), "{}", reason);

        server.await.unwrap();
    }
}
