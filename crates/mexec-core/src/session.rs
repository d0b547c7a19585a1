use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use crate::{ChannelId, MachineIdentifier};

/// Lifecycle status of an exec session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Channel assigned, output streaming.
    Active,
    /// Remote command exited.
    Completed,
    /// Remote command reported an error.
    Failed,
    /// A connection was closed from the remote side.
    ClosedByPeer,
    /// Local user interrupted the session.
    Interrupted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Live state of one exec, created once the service has assigned a channel.
#[derive(Debug)]
pub struct Session {
    identifier: MachineIdentifier,
    command: Vec<String>,
    channel_id: ChannelId,
    status: Mutex<SessionStatus>,
    teardown_started: AtomicBool,
}

impl Session {
    pub fn new(identifier: MachineIdentifier, command: Vec<String>, channel_id: ChannelId) -> Self {
        Self {
            identifier,
            command,
            channel_id,
            status: Mutex::new(SessionStatus::Active),
            teardown_started: AtomicBool::new(false),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.identifier.workspace_id
    }

    pub fn machine_name(&self) -> &str {
        &self.identifier.machine_name
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the session into a terminal status.
    ///
    /// Returns `false` when `status` is not terminal or the session already
    /// finished; a terminal status is never overwritten.
    pub fn finish(&self, status: SessionStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }

        let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_terminal() {
            return false;
        }
        *current = status;
        true
    }

    /// Claims the right to tear the session down. Only the first caller gets `true`.
    pub fn begin_teardown(&self) -> bool {
        !self.teardown_started.swap(true, Ordering::AcqRel)
    }

    pub fn teardown_started(&self) -> bool {
        self.teardown_started.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::{Session, SessionStatus};
    use crate::{ChannelId, MachineIdentifier};

    fn session() -> Session {
        Session::new(
            MachineIdentifier {
                machine_name: "tools".to_string(),
                workspace_id: "workspace-1".to_string(),
            },
            vec!["sh".to_string(), "-c".to_string(), "true".to_string()],
            ChannelId(42),
        )
    }

    #[test]
    fn terminal_status_is_never_overwritten() {
        let session = session();
        assert_eq!(session.status(), SessionStatus::Active);

        assert!(session.finish(SessionStatus::Failed));
        assert!(!session.finish(SessionStatus::Completed));
        assert!(!session.finish(SessionStatus::Interrupted));
        assert_eq!(session.status(), SessionStatus::Failed);
    }

    #[test]
    fn finishing_with_active_is_rejected() {
        let session = session();
        assert!(!session.finish(SessionStatus::Active));
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[test]
    fn teardown_is_claimed_once_across_threads() {
        let session = Arc::new(session());
        let winners = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.begin_teardown())
            })
            .map(|handle| handle.join().expect("thread should join"))
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(session.teardown_started());
    }

    #[test]
    fn accessors_expose_session_identity() {
        let session = session();
        assert_eq!(session.workspace_id(), "workspace-1");
        assert_eq!(session.machine_name(), "tools");
        assert_eq!(session.command().len(), 3);
        assert_eq!(session.channel_id(), ChannelId(42));
    }
}
