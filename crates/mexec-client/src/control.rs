use futures_util::{Stream, StreamExt, stream::SplitSink};
use mexec_core::{
    ChannelId, CreateParams, Endpoint, Frame, Notification, NotificationKind, SessionRequest,
    SessionResponse,
};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, info, warn};

use crate::{
    ExecError,
    codec::{decode, decode_frame, encode},
    framing::{read_frame, write_close, write_frame},
};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frames the service sends ahead of the create response; they are discarded unread.
pub const DEFAULT_ACK_FRAMES: usize = 1;

/// Progress of the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ControlState {
    Disconnected,
    Connected,
    HandshakeSent,
    ChannelAssigned,
    Listening,
    Failed,
    Completed,
    ClosedByPeer,
}

impl ControlState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Completed | Self::ClosedByPeer)
    }
}

/// Terminal outcome reported by the control listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// `onExecError` with its diagnostic text.
    ExecError { stack: String },
    /// `onExecExit`.
    ExecExit,
    /// The control connection ended without a lifecycle notification.
    ClosedByPeer,
}

impl ControlEvent {
    pub fn state(&self) -> ControlState {
        match self {
            Self::ExecError { .. } => ControlState::Failed,
            Self::ExecExit => ControlState::Completed,
            Self::ClosedByPeer => ControlState::ClosedByPeer,
        }
    }
}

/// Control connection used to negotiate an exec channel.
pub struct ControlSession {
    /// URL the connection was opened against.
    url: String,
    /// Connected socket.
    socket: WsStream,
    /// Current handshake progress.
    state: ControlState,
    /// Frames discarded before the create response.
    ack_frames: usize,
}

impl ControlSession {
    /// Connects to the control channel of `endpoint`.
    pub async fn open(endpoint: &Endpoint) -> Result<Self, ExecError> {
        let url = endpoint.connect_url();
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|source| ExecError::Connect {
                endpoint: url.clone(),
                source: Box::new(source),
            })?;
        debug!(endpoint = %url, "control connection established");

        let mut session = Self {
            url,
            socket,
            state: ControlState::Disconnected,
            ack_frames: DEFAULT_ACK_FRAMES,
        };
        session.advance(ControlState::Connected);
        Ok(session)
    }

    /// Overrides how many frames precede the create response.
    pub fn with_ack_frames(mut self, ack_frames: usize) -> Self {
        self.ack_frames = ack_frames;
        self
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Sends the create request and waits for the assigned channel id.
    ///
    /// Blocks until the service answers; there is no handshake timeout.
    pub async fn create_session(&mut self, params: CreateParams) -> Result<ChannelId, ExecError> {
        if self.state != ControlState::Connected {
            return Err(ExecError::Protocol(format!(
                "create requested in state {:?}",
                self.state
            )));
        }

        let request = SessionRequest::create(params);
        let payload = encode(&request)?;
        debug!(endpoint = %self.url, payload = %payload, "sending create request");
        write_frame(&mut self.socket, payload)
            .await
            .map_err(|err| ExecError::Protocol(format!("failed to send create request: {err}")))?;
        self.advance(ControlState::HandshakeSent);

        for index in 0..self.ack_frames {
            let ack = self.expect_frame("handshake acknowledgment").await?;
            debug!(frame = index, bytes = ack.len(), "discarding handshake acknowledgment");
        }

        let frame = self.expect_frame("create response").await?;
        let response: SessionResponse = decode(&frame)
            .map_err(|err| ExecError::Protocol(format!("create response is malformed: {err}")))?;

        if response.id != request.id {
            return Err(ExecError::Protocol(format!(
                "create response id mismatch: expected {}, got {}",
                request.id.0, response.id.0
            )));
        }

        self.advance(ControlState::ChannelAssigned);
        info!(channel_id = %response.result, "exec channel assigned");
        Ok(response.result)
    }

    /// Splits the connection and spawns the notification listener.
    ///
    /// The receiver fires once with the first terminal [`ControlEvent`].
    pub fn listen(mut self) -> Result<(ControlLink, oneshot::Receiver<ControlEvent>), ExecError> {
        if self.state != ControlState::ChannelAssigned {
            return Err(ExecError::Protocol(format!(
                "listen requested in state {:?}",
                self.state
            )));
        }
        self.advance(ControlState::Listening);

        let (sink, stream) = self.socket.split();
        let (event_tx, event_rx) = oneshot::channel();
        let listener = tokio::spawn(async move {
            let event = watch_notifications(Notifications::new(stream)).await;
            debug!(state = ?event.state(), "control listener finished");
            let _ = event_tx.send(event);
        });

        Ok((
            ControlLink {
                url: self.url,
                sink: Some(sink),
                listener: Some(listener),
            },
            event_rx,
        ))
    }

    async fn expect_frame(&mut self, what: &str) -> Result<Vec<u8>, ExecError> {
        match read_frame(&mut self.socket).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(ExecError::Protocol(format!(
                "control connection closed before {what}"
            ))),
            Err(err) => Err(ExecError::Protocol(format!("failed to read {what}: {err}"))),
        }
    }

    fn advance(&mut self, next: ControlState) {
        debug_assert!(next > self.state, "control state must move forward");
        debug!(from = ?self.state, to = ?next, "control state transition");
        self.state = next;
    }
}

/// Lazily decoded notifications read from the control connection.
pub struct Notifications<R> {
    reader: R,
}

impl<R> Notifications<R>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Returns the next notification, or `None` once the connection ends.
    ///
    /// Every frame is decoded on its own; malformed frames are skipped.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            let frame = match read_frame(&mut self.reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return None,
                Err(err) => {
                    debug!(error = %err, "control connection read failed");
                    return None;
                }
            };

            match decode_frame(&frame) {
                Ok(Frame::Notification(notification)) => return Some(notification),
                Ok(Frame::Response(response)) => {
                    debug!(id = response.id.0, "ignoring response on control connection");
                }
                Err(err) => warn!(error = %err, "skipping malformed control frame"),
            }
        }
    }
}

/// Consumes notifications until one ends the exec or the connection closes.
pub async fn watch_notifications<R>(mut notifications: Notifications<R>) -> ControlEvent
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(notification) = notifications.next_notification().await {
        match notification.kind() {
            NotificationKind::ExecError { stack } => {
                info!("received onExecError, closing the session");
                return ControlEvent::ExecError {
                    stack: stack.to_string(),
                };
            }
            NotificationKind::ExecExit => {
                info!("received onExecExit, closing the session");
                return ControlEvent::ExecExit;
            }
            NotificationKind::Unknown(method) => {
                debug!(method, "ignoring notification");
            }
        }
    }

    ControlEvent::ClosedByPeer
}

/// Write half of the control connection plus its listener task.
pub struct ControlLink {
    url: String,
    sink: Option<SplitSink<WsStream, Message>>,
    listener: Option<JoinHandle<()>>,
}

impl ControlLink {
    /// Sends a close frame and stops the listener. Closing twice is a no-op.
    ///
    /// The listener is not drained: the attach close has already spent the
    /// grace period, so teardown does not wait on the control peer as well.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(err) = write_close(&mut sink).await {
                debug!(endpoint = %self.url, error = %err, "control close frame not sent");
            }
        }

        if let Some(listener) = self.listener.take() {
            if !listener.is_finished() {
                debug!(endpoint = %self.url, "stopping control listener");
            }
            listener.abort();
        }
    }
}
