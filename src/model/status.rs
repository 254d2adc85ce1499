//! Deployment lifecycle state machine (C2).

use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`super::Deployment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created, not yet scheduled to a node.
    Pending,
    /// A node has been chosen.
    Scheduled,
    /// The start lifecycle is running.
    Starting,
    /// All containers are up.
    Running,
    /// The stop lifecycle is running.
    Stopping,
    /// All containers are stopped but not removed.
    Stopped,
    /// An unrecoverable error occurred during `starting`, `running`, or `stopping`.
    Failed,
    /// The remove lifecycle is running.
    Deleting,
    /// Terminal: all resources released.
    Deleted,
}

impl Status {
    /// Returns true if `to` is a legal transition target from `self`.
    #[must_use]
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::{Deleted, Deleting, Failed, Pending, Running, Scheduled, Starting, Stopped, Stopping};
        matches!(
            (self, to),
            (Pending, Scheduled)
                | (Scheduled, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
                | (Stopped, Starting)
                | (Stopped, Deleting)
                | (Failed, Starting)
                | (Failed, Deleting)
                | (Deleting, Deleted)
        )
    }

    /// Returns true if the status is `Deleted`, which has no outgoing transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Deleted)
    }

    /// Returns true if a deployment in this status is considered "live" for the purposes
    /// of template/node deletion guards (everything except `Deleted`).
    #[must_use]
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 9] = [
        Status::Pending,
        Status::Scheduled,
        Status::Starting,
        Status::Running,
        Status::Stopping,
        Status::Stopped,
        Status::Failed,
        Status::Deleting,
        Status::Deleted,
    ];

    #[test]
    fn transition_table_matches_spec() {
        let allowed: &[(Status, Status)] = &[
            (Status::Pending, Status::Scheduled),
            (Status::Scheduled, Status::Starting),
            (Status::Starting, Status::Running),
            (Status::Starting, Status::Failed),
            (Status::Running, Status::Stopping),
            (Status::Running, Status::Failed),
            (Status::Stopping, Status::Stopped),
            (Status::Stopping, Status::Failed),
            (Status::Stopped, Status::Starting),
            (Status::Stopped, Status::Deleting),
            (Status::Failed, Status::Starting),
            (Status::Failed, Status::Deleting),
            (Status::Deleting, Status::Deleted),
        ];

        for &from in &ALL {
            for &to in &ALL {
                let expect_allowed = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expect_allowed,
                    "transition {from:?} -> {to:?} expected allowed={expect_allowed}"
                );
            }
        }
    }

    #[test]
    fn deleted_is_terminal() {
        assert!(Status::Deleted.is_terminal());
        for &s in &ALL {
            if s != Status::Deleted {
                assert!(!s.can_transition_to(Status::Deleted) || s == Status::Deleting);
            }
        }
    }
}
