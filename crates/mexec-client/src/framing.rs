use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{
    Error as WsError, Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};

use crate::ExecError;

/// Reads the next data frame, skipping ping/pong traffic.
///
/// Returns `None` once the peer sent a close frame or the stream ended.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ExecError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = reader.next().await {
        match message? {
            Message::Text(text) => return Ok(Some(text.as_str().as_bytes().to_vec())),
            Message::Binary(data) => return Ok(Some(data.to_vec())),
            Message::Close(frame) => {
                tracing::debug!(?frame, "peer sent close frame");
                return Ok(None);
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    Ok(None)
}

/// Writes one text frame.
pub async fn write_frame<W>(writer: &mut W, payload: String) -> Result<(), ExecError>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    writer.send(Message::Text(payload.into())).await?;
    Ok(())
}

/// Starts the close handshake with a normal-closure (1000) frame.
pub async fn write_close<W>(writer: &mut W) -> Result<(), ExecError>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    writer.send(Message::Close(Some(frame))).await?;
    Ok(())
}
