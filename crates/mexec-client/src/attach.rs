use std::time::Duration;

use futures_util::{Stream, StreamExt, stream::SplitSink};
use mexec_core::{ChannelId, Endpoint};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, warn};

use crate::{
    ExecError,
    control::WsStream,
    framing::{read_frame, write_close},
};

/// Data connection carrying the raw byte stream of one exec.
pub struct AttachStream {
    url: String,
    socket: WsStream,
}

impl AttachStream {
    /// Connects to the data channel of an assigned exec.
    pub async fn open(endpoint: &Endpoint, channel_id: ChannelId) -> Result<Self, ExecError> {
        let url = endpoint.attach_url(channel_id);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|source| ExecError::Connect {
                endpoint: url.clone(),
                source: Box::new(source),
            })?;
        debug!(endpoint = %url, %channel_id, "attach connection established");
        Ok(Self { url, socket })
    }

    /// Spawns the read loop forwarding every chunk to `output`.
    ///
    /// The receiver fires once the loop has stopped.
    pub fn start<W>(self, output: W) -> (AttachHandle, oneshot::Receiver<()>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (sink, stream) = self.socket.split();
        let (ended_tx, ended_rx) = oneshot::channel();
        let url = self.url.clone();
        let reader = tokio::spawn(async move {
            let forwarded = forward_output(stream, output).await;
            debug!(endpoint = %url, bytes = forwarded, "attach read loop finished");
            let _ = ended_tx.send(());
        });

        (
            AttachHandle {
                url: self.url,
                sink: Some(sink),
                reader: Some(reader),
            },
            ended_rx,
        )
    }
}

/// Copies data frames verbatim into `output` until the stream ends or a write fails.
///
/// Returns the number of bytes forwarded.
pub async fn forward_output<R, W>(mut reader: R, mut output: W) -> u64
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut forwarded = 0_u64;

    loop {
        let chunk = match read_frame(&mut reader).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                debug!("attach stream closed by peer");
                return forwarded;
            }
            Err(err) => {
                debug!(error = %err, "attach stream read failed");
                return forwarded;
            }
        };

        if let Err(err) = write_chunk(&mut output, &chunk).await {
            warn!(error = %err, "failed to forward exec output");
            return forwarded;
        }
        forwarded = forwarded.saturating_add(chunk.len() as u64);
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(output: &mut W, chunk: &[u8]) -> Result<(), ExecError> {
    output.write_all(chunk).await?;
    output.flush().await?;
    Ok(())
}

/// Write half of the data connection plus its read loop.
pub struct AttachHandle {
    url: String,
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

impl AttachHandle {
    /// Closes the data connection. Closing twice is a no-op.
    ///
    /// With `with_handshake`, a normal-closure frame is sent first and the
    /// read loop gets up to `grace` to observe the peer's reply before it is
    /// aborted.
    pub async fn close(&mut self, with_handshake: bool, grace: Duration) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };
        let Some(mut reader) = self.reader.take() else {
            return;
        };

        let handshake_sent = with_handshake
            && match write_close(&mut sink).await {
                Ok(()) => true,
                Err(err) => {
                    debug!(endpoint = %self.url, error = %err, "attach close frame not sent");
                    false
                }
            };

        if handshake_sent {
            match timeout(grace, &mut reader).await {
                Ok(_) => debug!(endpoint = %self.url, "attach close acknowledged"),
                Err(_) => {
                    warn!(
                        endpoint = %self.url,
                        grace_ms = grace.as_millis() as u64,
                        "attach close not acknowledged, forcing"
                    );
                    reader.abort();
                }
            }
        } else {
            reader.abort();
        }
    }
}
