//! Server and client plumbing for the end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::api;
use crate::app::App;
use crate::infrastructure::auth::JwtAuthenticator;
use crate::infrastructure::bus::InMemoryBus;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::{AoiConfig, AppConfig, InterpreterConfig};
use crate::infrastructure::store::FsDocumentStore;
use crate::infrastructure::templates::FsTemplateSource;
use crate::use_cases::handlers::test_support::{sample_view_template, sample_world, ANCHOR, EXP};

pub const SECRET: &str = "e2e-secret";
pub const IN_ZONE: (f64, f64) = ANCHOR;
pub const FAR_AWAY: (f64, f64) = (51.5074, -0.1278);

const BOTTLE_TEMPLATE: &str = r#"---
semantic_name: Mysterious Bottle
collectible: true
---

## Description

A sea-worn bottle with a rolled note inside.
"#;

/// A running engine over a tempdir content root.
pub struct TestServer {
    pub addr: SocketAddr,
    pub app: Arc<App>,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_content(dir.path()).await;

        let config = AppConfig {
            content_root: dir.path().to_path_buf(),
            server_port: 0,
            auth_secret: SECRET.to_string(),
            cors_allowed_origins: vec!["*".to_string()],
            interpreter: InterpreterConfig {
                url: None,
                timeout_seconds: 30,
            },
            aoi: AoiConfig { zone_radius_m: 500.0 },
        };
        let app = Arc::new(App::new(
            config,
            Arc::new(FsDocumentStore::new(dir.path())),
            Arc::new(InMemoryBus::new()),
            Arc::new(FsTemplateSource::new(dir.path())),
            None,
            Arc::new(JwtAuthenticator::new(SECRET)),
            Arc::new(SystemClock::new()),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        {
            let app = app.clone();
            tokio::spawn(async move {
                let _ = axum::serve(listener, api::router(app)).await;
            });
        }

        Self {
            addr,
            app,
            _dir: dir,
        }
    }

    pub async fn connect(&self, token: &str) -> TestClient {
        let url = format!(
            "ws://{}/ws/experience?token={token}&experience={EXP}",
            self.addr
        );
        let (stream, _) = tokio_tungstenite::connect_async(url).await.expect("connect");
        TestClient {
            stream,
            pending: std::collections::VecDeque::new(),
        }
    }
}

async fn seed_content(root: &std::path::Path) {
    let state_dir = root.join(EXP).join("state");
    tokio::fs::create_dir_all(&state_dir).await.expect("mkdir state");
    for name in ["world.json", "world.template.json"] {
        tokio::fs::write(
            state_dir.join(name),
            serde_json::to_vec_pretty(&sample_world()).expect("serialize"),
        )
        .await
        .expect("seed world");
    }
    tokio::fs::write(
        state_dir.join("view.template.json"),
        serde_json::to_vec_pretty(&sample_view_template()).expect("serialize"),
    )
    .await
    .expect("seed view template");

    let items_dir = root.join(EXP).join("templates").join("items");
    tokio::fs::create_dir_all(&items_dir).await.expect("mkdir templates");
    tokio::fs::write(items_dir.join("bottle.md"), BOTTLE_TEMPLATE)
        .await
        .expect("seed template");
}

#[derive(Serialize)]
struct Claims {
    sub: String,
    email: Option<String>,
    exp: i64,
}

/// Mint a valid HS256 token for a test user.
pub fn token_for(user: &str) -> String {
    encode(
        &Header::default(),
        &Claims {
            sub: user.to_string(),
            email: Some(format!("{user}@example.com")),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode token")
}

/// Mint a token signed with the wrong secret.
pub fn bad_token() -> String {
    encode(
        &Header::default(),
        &Claims {
            sub: "intruder".to_string(),
            email: None,
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
        },
        &EncodingKey::from_secret(b"other-secret"),
    )
    .expect("encode token")
}

pub struct TestClient {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    /// Messages read past while waiting for a specific type; ordering
    /// between `action_response` and pushed deltas is not guaranteed.
    pending: std::collections::VecDeque<Value>,
}

impl TestClient {
    pub async fn send(&mut self, message: Value) {
        self.stream
            .send(Message::Text(message.to_string().into()))
            .await
            .expect("send");
    }

    /// The next JSON message, within a bounded wait.
    pub async fn recv(&mut self) -> Value {
        if let Some(message) = self.pending.pop_front() {
            return message;
        }
        self.recv_from_stream().await
    }

    async fn recv_from_stream(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("timed out waiting for message")
                .expect("stream ended")
                .expect("transport error");
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("valid json")
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    /// The next message of the given type; anything else read on the way is
    /// kept for later `recv`/`recv_type` calls.
    pub async fn recv_type(&mut self, wanted: &str) -> Value {
        if let Some(index) = self.pending.iter().position(|m| m["type"] == wanted) {
            return self.pending.remove(index).expect("indexed");
        }
        for _ in 0..16 {
            let message = self.recv_from_stream().await;
            if message["type"] == wanted {
                return message;
            }
            self.pending.push_back(message);
        }
        panic!("no {wanted} message arrived");
    }

    /// Expect the server to close the connection with the given code.
    pub async fn expect_close(&mut self, code: CloseCode) {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("timed out waiting for close");
            match frame {
                Some(Ok(Message::Close(Some(close)))) => {
                    assert_eq!(close.code, code);
                    return;
                }
                Some(Ok(Message::Close(None))) => panic!("close without code"),
                Some(Ok(_)) => continue,
                // The server may simply drop after the close frame.
                Some(Err(_)) | None => return,
            }
        }
    }

    pub async fn update_location(&mut self, fix: (f64, f64)) -> Value {
        self.send(json!({"type": "update_location", "lat": fix.0, "lng": fix.1}))
            .await;
        self.recv_type("area_of_interest").await
    }

    pub async fn action(&mut self, action: Value) -> Value {
        self.send(action).await;
        self.recv_type("action_response").await
    }
}
