#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use quickmark::relay::{router, RelayState};
use quickmark::RelayConfig;
use serde_json::Value;
use tokio::net::TcpListener;

/// What the fake automation API answers.
#[derive(Clone)]
pub enum Reply {
    /// 200 with these body chunks, flushed one by one.
    Chunks(Vec<Vec<u8>>),
    /// Non-success status with a plain-text body.
    Status(u16, String),
}

impl Reply {
    pub fn lines(lines: &[&str]) -> Self {
        Reply::Chunks(lines.iter().map(|l| format!("{}\n", l).into_bytes()).collect())
    }
}

type Recorded = Arc<Mutex<Vec<Value>>>;

pub struct FakeUpstream {
    pub addr: SocketAddr,
    recorded: Recorded,
}

impl FakeUpstream {
    pub fn url(&self) -> String {
        format!("http://{}/mark", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.recorded.lock().unwrap().clone()
    }
}

async fn handle_mark(
    State((reply, recorded)): State<(Reply, Recorded)>,
    Json(body): Json<Value>,
) -> Response {
    recorded.lock().unwrap().push(body);
    match reply {
        Reply::Chunks(chunks) => {
            let stream = futures::stream::iter(chunks).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, std::io::Error>(chunk)
            });
            Response::new(Body::from_stream(stream))
        }
        Reply::Status(code, text) => {
            let status = StatusCode::from_u16(code).unwrap();
            (status, text).into_response()
        }
    }
}

pub async fn spawn_upstream(reply: Reply) -> FakeUpstream {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/mark", post(handle_mark))
        .with_state((reply, recorded.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeUpstream { addr, recorded }
}

/// Start the relay on an ephemeral port; returns its base URL.
pub async fn spawn_relay(upstream_url: Option<String>) -> String {
    let config = RelayConfig {
        upstream_url,
        ..RelayConfig::default()
    };
    let app = router(RelayState::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/mark", addr)
}

pub fn credentials_query() -> Vec<(&'static str, &'static str)> {
    vec![
        ("user_email", "a@b.c"),
        ("quickchex_pass", "pw"),
        ("gmail_app_password", "apppw"),
    ]
}
