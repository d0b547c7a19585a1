use mexec_core::ConfigError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Setup, transport and serialization failures of an exec session.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Required input missing before any connection attempt.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Control or data endpoint could not be reached.
    #[error("machine exec is not reachable at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    /// Session-create handshake did not produce a channel id.
    #[error("handshake failed: {0}")]
    Protocol(String),
    /// Frame payload was not a well-formed control message.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// Request encoding failed.
    #[error("failed to encode json payload: {0}")]
    Encode(String),
    /// WebSocket failure after the session was set up.
    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),
    /// Local sink write failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
