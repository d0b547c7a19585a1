use serde::{Deserialize, Deserializer, Serialize, de::IgnoredAny};

use crate::{ChannelId, ReqId};

/// JSON-RPC version carried by every control frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the session-create request.
pub const CREATE_METHOD: &str = "create";

/// Notification sent when the remote command failed.
pub const ON_EXEC_ERROR: &str = "onExecError";

/// Notification sent when the remote command exited.
pub const ON_EXEC_EXIT: &str = "onExecExit";

/// Correlation id used for the one create request of a session.
pub const CREATE_REQ_ID: ReqId = ReqId(0);

/// Initial terminal columns requested for the exec.
pub const DEFAULT_COLS: u16 = 80;

/// Initial terminal rows requested for the exec.
pub const DEFAULT_ROWS: u16 = 24;

/// Container name used when the caller does not pick one.
pub const DEFAULT_MACHINE: &str = "tools";

/// Names the container an exec runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineIdentifier {
    /// Container (machine) name inside the workspace.
    pub machine_name: String,
    /// Workspace owning the container.
    pub workspace_id: String,
}

/// Parameters of the `create` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateParams {
    /// Target container.
    pub identifier: MachineIdentifier,
    /// Executable and argument vector.
    pub cmd: Vec<String>,
    /// Initial terminal columns.
    pub cols: u16,
    /// Initial terminal rows.
    pub rows: u16,
    /// Whether the remote side allocates a TTY.
    pub tty: bool,
}

/// JSON-RPC request asking the service to create an exec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Request correlation id.
    pub id: ReqId,
    /// Always [`CREATE_METHOD`].
    pub method: String,
    /// Create parameters.
    pub params: CreateParams,
}

impl SessionRequest {
    /// Builds the create request sent once per session.
    pub fn create(params: CreateParams) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: CREATE_REQ_ID,
            method: CREATE_METHOD.to_string(),
            params,
        }
    }
}

/// Reply to a [`SessionRequest`] carrying the assigned channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Id echoed from the request.
    pub id: ReqId,
    /// Channel id to attach to.
    pub result: ChannelId,
    /// JSON-RPC version reported by the service.
    #[serde(default)]
    pub jsonrpc: String,
}

/// Asynchronous lifecycle notification from the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<NotificationParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationParams {
    /// Exec the notification refers to, as text.
    ///
    /// Informational only: numbers and strings are kept, any other shape
    /// reads as `None` so it never rejects the notification.
    #[serde(
        default,
        deserialize_with = "lenient_exec_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Diagnostic text; only present on errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

fn lenient_exec_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Wire::deserialize(deserializer)? {
        Wire::Unsigned(value) => Some(value.to_string()),
        Wire::Signed(value) => Some(value.to_string()),
        Wire::Float(value) => Some(value.to_string()),
        Wire::Text(value) => Some(value),
        Wire::Other(_) => None,
    })
}

/// Lifecycle meaning of a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind<'a> {
    /// The remote command failed with diagnostic text.
    ExecError { stack: &'a str },
    /// The remote command exited.
    ExecExit,
    /// Any method this driver does not act on.
    Unknown(&'a str),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind<'_> {
        match self.method.as_str() {
            ON_EXEC_ERROR => NotificationKind::ExecError {
                stack: self
                    .params
                    .as_ref()
                    .and_then(|params| params.stack.as_deref())
                    .unwrap_or_default(),
            },
            ON_EXEC_EXIT => NotificationKind::ExecExit,
            other => NotificationKind::Unknown(other),
        }
    }
}

/// One decoded control-channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A frame carrying `result`.
    Response(SessionResponse),
    /// A frame carrying `method`.
    Notification(Notification),
}
