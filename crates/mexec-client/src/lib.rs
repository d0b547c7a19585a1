//! WebSocket driver for machine-exec sessions: control handshake, attach stream and shutdown.

mod error;

pub mod attach;
pub mod codec;
pub mod control;
pub mod driver;
pub mod framing;
pub mod shutdown;

pub use attach::{AttachHandle, AttachStream};
pub use control::{ControlEvent, ControlLink, ControlSession, ControlState};
pub use driver::{CallOptions, DEFAULT_GRACE, SessionOutcome, call};
pub use error::ExecError;
pub use shutdown::{Connections, ShutdownCoordinator, ShutdownSignals, ShutdownTrigger, Teardown};
