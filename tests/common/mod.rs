#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use colabri_sync::config::Config;
use colabri_sync::services::snapshot_store::MemorySnapshotStore;
use colabri_sync::{create_app, AppState};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const SECRET: &str = "integration-secret";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.cloud_auth_jwt_secret = Some(SECRET.to_string());
    config.persist_max_attempts = 2;
    config.persist_backoff_ms = 5;
    config
}

pub fn test_state() -> Arc<AppState> {
    AppState::new(test_config(), Arc::new(MemorySnapshotStore::new()))
}

pub fn token_for(user_id: &str, name: &str) -> String {
    let claims = json!({
        "sub": user_id,
        "name": name,
        "exp": Utc::now().timestamp() + 600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Serve the full app on an ephemeral port
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub connection_id: String,
}

impl TestClient {
    /// Open a socket and consume the `connected` greeting
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        let mut client = Self {
            ws,
            connection_id: String::new(),
        };
        let greeting = client.recv().await;
        assert_eq!(greeting["type"], "connected");
        client.connection_id = greeting["connectionId"].as_str().unwrap().to_string();
        client
    }

    /// Connect and authenticate as `user_id`
    pub async fn login(addr: SocketAddr, user_id: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(json!({"type": "auth", "token": token_for(user_id, user_id)})).await;
        let reply = client.recv().await;
        assert_eq!(reply["type"], "authenticated", "unexpected reply: {}", reply);
        client
    }

    pub async fn join(&mut self, room_id: &str) -> Value {
        self.send(json!({"type": "join", "roomId": room_id})).await;
        self.recv_type("joined").await
    }

    pub async fn send(&mut self, message: Value) {
        self.ws.send(Message::text(message.to_string())).await.unwrap();
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.ws.send(message).await.unwrap();
    }

    /// Next JSON frame from the server
    pub async fn recv(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Skip frames until one of the given type arrives
    pub async fn recv_type(&mut self, message_type: &str) -> Value {
        loop {
            let message = self.recv().await;
            if message["type"] == message_type {
                return message;
            }
        }
    }

    /// Round-trip a ping; every frame queued before the pong is returned
    pub async fn drain(&mut self) -> Vec<Value> {
        self.send(json!({"type": "ping"})).await;
        let mut seen = Vec::new();
        loop {
            let message = self.recv().await;
            if message["type"] == "pong" {
                return seen;
            }
            seen.push(message);
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Poll until `check` holds or a few seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}
