use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use mexec_core::{Session, SessionStatus};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::oneshot,
};
use tracing::{debug, info};

use crate::{ExecError, attach::AttachHandle, control::ControlEvent, control::ControlLink};

/// Closes the connections of a session in the order the coordinator asks for.
#[async_trait]
pub trait Teardown: Send {
    /// Closes the data connection, optionally with a bounded close handshake.
    async fn close_attach(&mut self, with_handshake: bool);

    /// Closes the control connection.
    async fn close_control(&mut self);
}

/// Both live connections of a session.
pub struct Connections {
    attach: AttachHandle,
    control: ControlLink,
    grace: Duration,
}

impl Connections {
    pub fn new(attach: AttachHandle, control: ControlLink, grace: Duration) -> Self {
        Self {
            attach,
            control,
            grace,
        }
    }
}

#[async_trait]
impl Teardown for Connections {
    async fn close_attach(&mut self, with_handshake: bool) {
        self.attach.close(with_handshake, self.grace).await;
    }

    async fn close_control(&mut self) {
        self.control.close().await;
    }
}

/// Signal that ended the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// `onExecError` with its diagnostic text.
    ExecError { stack: String },
    /// `onExecExit`.
    ExecExit,
    /// Control connection ended without a lifecycle notification.
    ControlClosed,
    /// Attach read loop stopped.
    StreamEnded,
    /// Local interrupt.
    Interrupted,
}

impl ShutdownTrigger {
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::ExecError { .. } => SessionStatus::Failed,
            Self::ExecExit => SessionStatus::Completed,
            Self::ControlClosed | Self::StreamEnded => SessionStatus::ClosedByPeer,
            Self::Interrupted => SessionStatus::Interrupted,
        }
    }
}

impl From<ControlEvent> for ShutdownTrigger {
    fn from(event: ControlEvent) -> Self {
        match event {
            ControlEvent::ExecError { stack } => Self::ExecError { stack },
            ControlEvent::ExecExit => Self::ExecExit,
            ControlEvent::ClosedByPeer => Self::ControlClosed,
        }
    }
}

/// Terminal signals raised by the background listeners.
pub struct ShutdownSignals {
    pub control: oneshot::Receiver<ControlEvent>,
    pub attach: oneshot::Receiver<()>,
}

/// Waits for the first terminal signal and tears the session down once.
pub struct ShutdownCoordinator<T> {
    session: Arc<Session>,
    teardown: T,
}

impl<T: Teardown> ShutdownCoordinator<T> {
    pub fn new(session: Arc<Session>, teardown: T) -> Self {
        Self { session, teardown }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Waits for whichever of control, attach or `interrupt` fires first, then shuts down.
    pub async fn run<I, E>(
        &mut self,
        signals: ShutdownSignals,
        interrupt: I,
        errors: &mut E,
    ) -> Result<ShutdownTrigger, ExecError>
    where
        I: Future<Output = ()>,
        E: AsyncWrite + Unpin,
    {
        let ShutdownSignals { control, attach } = signals;

        let trigger = tokio::select! {
            event = control => match event {
                Ok(event) => ShutdownTrigger::from(event),
                Err(_) => ShutdownTrigger::ControlClosed,
            },
            _ = attach => ShutdownTrigger::StreamEnded,
            () = interrupt => {
                info!("interrupt received, closing the session");
                ShutdownTrigger::Interrupted
            }
        };

        self.shutdown(trigger, errors).await
    }

    /// Runs the teardown sequence unless it already ran for this session.
    pub async fn shutdown<E>(
        &mut self,
        trigger: ShutdownTrigger,
        errors: &mut E,
    ) -> Result<ShutdownTrigger, ExecError>
    where
        E: AsyncWrite + Unpin,
    {
        if !self.session.begin_teardown() {
            debug!(?trigger, "teardown already started, ignoring trigger");
            return Ok(trigger);
        }

        self.session.finish(trigger.status());
        info!(
            channel_id = %self.session.channel_id(),
            status = ?self.session.status(),
            "tearing down exec session"
        );

        let relayed = match &trigger {
            ShutdownTrigger::ExecError { stack } => relay_stack(errors, stack).await,
            _ => Ok(()),
        };

        self.teardown.close_attach(true).await;
        self.teardown.close_control().await;

        relayed.map(|()| trigger)
    }
}

async fn relay_stack<E: AsyncWrite + Unpin>(errors: &mut E, stack: &str) -> Result<(), ExecError> {
    errors.write_all(stack.as_bytes()).await?;
    errors.write_all(b"\n").await?;
    errors.flush().await?;
    Ok(())
}
