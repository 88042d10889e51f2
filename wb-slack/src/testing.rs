//! In-process stand-in for the hub: the two handshake endpoints plus the
//! realtime websocket, all on one loopback axum server.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

pub(crate) struct MockHubOptions {
    pub auth_ok: bool,
    pub connect_status: u16,
    pub user_id: String,
}

impl Default for MockHubOptions {
    fn default() -> Self {
        Self {
            auth_ok: true,
            connect_status: 200,
            user_id: "U123".to_string(),
        }
    }
}

/// What the hub saw from the client.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HubFrame {
    Text(Value),
    Close(Option<u16>),
}

enum HubCommand {
    Text(String),
    Close,
}

#[derive(Clone)]
struct HubState {
    addr: SocketAddr,
    options: Arc<MockHubOptions>,
    to_client: Arc<Mutex<Option<mpsc::UnboundedReceiver<HubCommand>>>>,
    from_client: mpsc::UnboundedSender<HubFrame>,
    authorization: Arc<std::sync::Mutex<Option<String>>>,
    dials: Arc<AtomicUsize>,
}

pub(crate) struct MockHub {
    addr: SocketAddr,
    to_client: mpsc::UnboundedSender<HubCommand>,
    from_client: mpsc::UnboundedReceiver<HubFrame>,
    authorization: Arc<std::sync::Mutex<Option<String>>>,
    dials: Arc<AtomicUsize>,
    server: JoinHandle<()>,
}

impl MockHub {
    pub async fn start(options: MockHubOptions) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock hub");
        let addr = listener.local_addr().expect("mock hub addr");
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        let authorization = Arc::new(std::sync::Mutex::new(None));
        let dials = Arc::new(AtomicUsize::new(0));

        let state = HubState {
            addr,
            options: Arc::new(options),
            to_client: Arc::new(Mutex::new(Some(to_client_rx))),
            from_client: from_client_tx,
            authorization: authorization.clone(),
            dials: dials.clone(),
        };
        let router = Router::new()
            .route("/api/auth.test", get(auth_test))
            .route("/api/rtm.connect", get(rtm_connect))
            .route("/rtm", get(ws_upgrade))
            .with_state(state);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            addr,
            to_client: to_client_tx,
            from_client: from_client_rx,
            authorization,
            dials,
            server,
        }
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn send(&self, frame: Value) {
        self.send_raw(&frame.to_string());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_client.send(HubCommand::Text(text.to_string()));
    }

    /// Hub-initiated close of the realtime transport.
    pub fn disconnect(&self) {
        let _ = self.to_client.send(HubCommand::Close);
    }

    pub fn message(&self, text: &str) {
        self.send(json!({
            "type": "message",
            "user": "U777",
            "channel": "C1",
            "text": text,
            "ts": "1716572940.000100",
        }));
    }

    pub async fn next_frame(&mut self) -> HubFrame {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("mock hub closed")
    }

    /// Next text frame that is not a keepalive ping.
    pub async fn next_text(&mut self) -> Value {
        loop {
            match self.next_frame().await {
                HubFrame::Text(value) if value["type"] == "ping" => continue,
                HubFrame::Text(value) => return value,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    pub async fn no_frame_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.from_client.recv()).await.is_err()
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.authorization
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Polls `ready` until it holds, failing the test after five seconds.
pub(crate) async fn wait_until(mut ready: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ready() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

impl Drop for MockHub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn record_authorization(state: &HubState, headers: &HeaderMap) {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    *state
        .authorization
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner) = value;
}

async fn auth_test(State(state): State<HubState>, headers: HeaderMap) -> Json<Value> {
    record_authorization(&state, &headers);
    if state.options.auth_ok {
        Json(json!({
            "ok": true,
            "user": "wagerbot",
            "user_id": state.options.user_id,
        }))
    } else {
        Json(json!({ "ok": false, "error": "invalid_auth" }))
    }
}

async fn rtm_connect(State(state): State<HubState>, headers: HeaderMap) -> Response {
    record_authorization(&state, &headers);
    if state.options.connect_status != 200 {
        let status = StatusCode::from_u16(state.options.connect_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "hub unavailable").into_response();
    }
    Json(json!({ "ok": true, "url": format!("ws://{}/rtm", state.addr) })).into_response()
}

async fn ws_upgrade(State(state): State<HubState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    state.dials.fetch_add(1, Ordering::SeqCst);
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: HubState, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let Some(mut to_client) = state.to_client.lock().await.take() else {
        return;
    };

    let outbound_task = tokio::spawn(async move {
        while let Some(command) = to_client.recv().await {
            let msg = match command {
                HubCommand::Text(text) => Message::Text(text.into()),
                HubCommand::Close => Message::Close(None),
            };
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let frame = match msg {
            Message::Text(text) => HubFrame::Text(
                serde_json::from_str(text.as_str())
                    .unwrap_or_else(|_| Value::String(text.to_string())),
            ),
            Message::Close(frame) => HubFrame::Close(frame.map(|f| f.code)),
            _ => continue,
        };
        let _ = state.from_client.send(frame);
    }

    outbound_task.abort();
}
