use std::{future::Future, sync::Arc, time::Duration};

use mexec_core::{
    ChannelId, CreateParams, DEFAULT_COLS, DEFAULT_MACHINE, DEFAULT_ROWS, Endpoint,
    MachineIdentifier, Session, SessionStatus, workspace_id_from,
};
use tokio::io::AsyncWrite;
use tracing::info;

use crate::{
    ExecError,
    attach::AttachStream,
    control::{ControlSession, DEFAULT_ACK_FRAMES},
    shutdown::{Connections, ShutdownCoordinator, ShutdownSignals, ShutdownTrigger},
};

/// Time the peer gets to answer a close handshake before the connection is dropped.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// What to run and where.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Machine-exec service address.
    pub endpoint: Endpoint,
    /// Target container name.
    pub machine_name: String,
    /// Executable and argument vector.
    pub command: Vec<String>,
    /// Initial terminal columns.
    pub cols: u16,
    /// Initial terminal rows.
    pub rows: u16,
    /// Whether to request a remote TTY.
    pub tty: bool,
    /// Close handshake grace period.
    pub grace: Duration,
    /// Frames preceding the create response.
    pub ack_frames: usize,
}

impl CallOptions {
    pub fn new(endpoint: Endpoint, machine_name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            endpoint,
            machine_name: machine_name.into(),
            command,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            tty: false,
            grace: DEFAULT_GRACE,
            ack_frames: DEFAULT_ACK_FRAMES,
        }
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new(Endpoint::default(), DEFAULT_MACHINE, Vec::new())
    }
}

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub channel_id: ChannelId,
    pub status: SessionStatus,
    pub trigger: ShutdownTrigger,
}

/// Runs one remote command and relays its output until the session ends.
///
/// `lookup` resolves environment input before any connection is made,
/// `interrupt` completes on local interruption, `output` receives the exec
/// byte stream and `errors` receives remote diagnostic text.
pub async fn call<L, I, O, E>(
    options: CallOptions,
    lookup: L,
    interrupt: I,
    output: O,
    errors: &mut E,
) -> Result<SessionOutcome, ExecError>
where
    L: Fn(&str) -> Option<String>,
    I: Future<Output = ()>,
    O: AsyncWrite + Send + Unpin + 'static,
    E: AsyncWrite + Unpin,
{
    let workspace_id = workspace_id_from(lookup)?;
    let identifier = MachineIdentifier {
        machine_name: options.machine_name,
        workspace_id,
    };

    let mut control = ControlSession::open(&options.endpoint)
        .await?
        .with_ack_frames(options.ack_frames);
    let channel_id = control
        .create_session(CreateParams {
            identifier: identifier.clone(),
            cmd: options.command.clone(),
            cols: options.cols,
            rows: options.rows,
            tty: options.tty,
        })
        .await?;

    let session = Arc::new(Session::new(identifier, options.command, channel_id));
    let (mut control_link, control_events) = control.listen()?;

    let attach = match AttachStream::open(&options.endpoint, channel_id).await {
        Ok(attach) => attach,
        Err(err) => {
            control_link.close().await;
            return Err(err);
        }
    };
    let (attach_handle, attach_ended) = attach.start(output);

    let mut coordinator = ShutdownCoordinator::new(
        Arc::clone(&session),
        Connections::new(attach_handle, control_link, options.grace),
    );
    let trigger = coordinator
        .run(
            ShutdownSignals {
                control: control_events,
                attach: attach_ended,
            },
            interrupt,
            errors,
        )
        .await?;

    info!(%channel_id, status = ?session.status(), "exec session finished");
    Ok(SessionOutcome {
        channel_id,
        status: session.status(),
        trigger,
    })
}
