//! Wire types and session state shared by the machine-exec driver.

pub mod config;
pub mod endpoint;
pub mod ids;
pub mod protocol;
pub mod session;

pub use config::{ConfigError, WORKSPACE_ID_ENV, workspace_id_from, workspace_id_from_env};
pub use endpoint::{DEFAULT_ENDPOINT, ENDPOINT_ENV, Endpoint, default_endpoint};
pub use ids::{ChannelId, ReqId};
pub use protocol::{
    CREATE_METHOD, CREATE_REQ_ID, CreateParams, DEFAULT_COLS, DEFAULT_MACHINE, DEFAULT_ROWS,
    Frame, JSONRPC_VERSION, MachineIdentifier, Notification, NotificationKind,
    NotificationParams, ON_EXEC_ERROR, ON_EXEC_EXIT, SessionRequest, SessionResponse,
};
pub use session::{Session, SessionStatus};
