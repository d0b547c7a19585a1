#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures_util::{SinkExt, StreamExt};
use mexec_core::Endpoint;
use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::{JoinHandle, JoinSet},
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        protocol::frame::coding::CloseCode,
    },
};

pub const ACK_FRAME: &str = r#"{"jsonrpc":"2.0","method":"connected","params":{}}"#;

pub fn response_frame(channel: u64) -> String {
    format!(r#"{{"id":0,"result":{channel},"jsonrpc":"2.0"}}"#)
}

pub fn exec_error_frame(channel: u64, stack: &str) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","method":"onExecError","params":{{"id":{channel},"stack":"{stack}"}}}}"#
    )
}

pub fn exec_exit_frame(channel: u64) -> String {
    format!(r#"{{"jsonrpc":"2.0","method":"onExecExit","params":{{"id":{channel}}}}}"#)
}

/// What the fake service does on each connection.
#[derive(Debug, Clone)]
pub struct Script {
    /// Frames sent on `/connect` after the create request.
    pub handshake: Vec<String>,
    /// Close the control connection right after the handshake frames.
    pub close_control: bool,
    /// Frames sent on `/connect` once attach output has been delivered.
    pub notifications: Vec<String>,
    /// Binary chunks sent on `/attach/<id>`.
    pub output: Vec<Vec<u8>>,
    /// Close the attach connection right after the output.
    pub close_attach: bool,
    /// Keep reading attach so a client close frame is answered.
    pub answer_close: bool,
    /// Keep reading control so a client close frame is answered.
    pub answer_control_close: bool,
}

impl Script {
    pub fn channel(channel: u64) -> Self {
        Self {
            handshake: vec![ACK_FRAME.to_string(), response_frame(channel)],
            close_control: false,
            notifications: Vec::new(),
            output: Vec::new(),
            close_attach: false,
            answer_close: true,
            answer_control_close: true,
        }
    }
}

/// Observations recorded by the fake service.
pub struct ServerState {
    pub control_dials: AtomicUsize,
    pub attach_dials: AtomicUsize,
    pub attach_paths: Mutex<Vec<String>>,
    pub create_requests: Mutex<Vec<Value>>,
    pub attach_close_frames: AtomicUsize,
    attached: watch::Sender<bool>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            control_dials: AtomicUsize::new(0),
            attach_dials: AtomicUsize::new(0),
            attach_paths: Mutex::new(Vec::new()),
            create_requests: Mutex::new(Vec::new()),
            attach_close_frames: AtomicUsize::new(0),
            attached: watch::channel(false).0,
        }
    }

    /// Resolves once attach output has been written.
    pub async fn wait_attached(&self) {
        let mut attached = self.attached.subscribe();
        let _ = attached.wait_for(|done| *done).await;
    }

    pub fn total_dials(&self) -> usize {
        self.control_dials.load(Ordering::SeqCst) + self.attach_dials.load(Ordering::SeqCst)
    }
}

pub struct FakeMachineExec {
    pub endpoint: Endpoint,
    pub state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl FakeMachineExec {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr: SocketAddr = listener.local_addr().expect("listener address");
        let state = Arc::new(ServerState::new());

        let script = Arc::new(script);
        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                connections.spawn(handle_connection(
                    stream,
                    Arc::clone(&script),
                    Arc::clone(&accept_state),
                ));
            }
        });

        Self {
            endpoint: Endpoint::new(format!("ws://{addr}")),
            state,
            task,
        }
    }
}

impl Drop for FakeMachineExec {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(stream: TcpStream, script: Arc<Script>, state: Arc<ServerState>) {
    let mut path = String::new();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();
        Ok(response)
    };
    let Ok(socket) = accept_hdr_async(stream, callback).await else {
        return;
    };

    if path == "/connect" {
        serve_control(socket, &script, &state).await;
    } else if path.starts_with("/attach/") {
        state
            .attach_paths
            .lock()
            .expect("attach paths lock")
            .push(path);
        serve_attach(socket, &script, &state).await;
    }
}

async fn serve_control(
    mut socket: WebSocketStream<TcpStream>,
    script: &Script,
    state: &ServerState,
) {
    state.control_dials.fetch_add(1, Ordering::SeqCst);

    let Some(Ok(Message::Text(request))) = socket.next().await else {
        return;
    };
    if let Ok(value) = serde_json::from_str::<Value>(request.as_str()) {
        state
            .create_requests
            .lock()
            .expect("create requests lock")
            .push(value);
    }

    for frame in &script.handshake {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }
    if script.close_control {
        let _ = socket.close(None).await;
        return;
    }

    if !script.notifications.is_empty() {
        state.wait_attached().await;
        for frame in &script.notifications {
            if socket.send(Message::Text(frame.clone().into())).await.is_err() {
                return;
            }
        }
    }

    if script.answer_control_close {
        while let Some(Ok(_)) = socket.next().await {}
    } else {
        std::future::pending::<()>().await;
    }
}

async fn serve_attach(mut socket: WebSocketStream<TcpStream>, script: &Script, state: &ServerState) {
    state.attach_dials.fetch_add(1, Ordering::SeqCst);

    for chunk in &script.output {
        if socket
            .send(Message::Binary(chunk.clone().into()))
            .await
            .is_err()
        {
            return;
        }
    }
    state.attached.send_replace(true);

    if script.close_attach {
        let _ = socket.close(None).await;
        while let Some(Ok(_)) = socket.next().await {}
        return;
    }

    if script.answer_close {
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Close(Some(frame))) if frame.code == CloseCode::Normal => {
                    state.attach_close_frames.fetch_add(1, Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    } else {
        // Never read again, so a client close frame stays unanswered.
        std::future::pending::<()>().await;
    }
}
