use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Where a locally recorded playground stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaygroundSyncStatus {
    /// Never accepted by the server.
    LocalOnly,
    Synced,
    /// Accepted once, with local commits not yet pushed.
    Modified,
    /// The server moved on from the local base; needs manual resolution.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitSyncStatus {
    LocalOnly,
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEvent {
    /// The server accepted the pending work.
    Accepted,
    /// A new local commit was queued.
    Edited,
    /// The server's history no longer starts from the local base.
    Diverged,
    /// The user resolved a conflict.
    Resolved,
}

impl PlaygroundSyncStatus {
    /// Transition table. `None` marks an illegal transition; no event ever
    /// leads back to `LocalOnly`.
    #[must_use]
    pub fn apply(self, event: SyncEvent) -> Option<Self> {
        use PlaygroundSyncStatus::*;
        use SyncEvent::*;

        match (self, event) {
            (LocalOnly | Synced | Modified, Accepted) => Some(Synced),
            (LocalOnly, Edited) => Some(LocalOnly),
            (Synced | Modified, Edited) => Some(Modified),
            (Conflict, Edited) => Some(Conflict),
            (_, Diverged) => Some(Conflict),
            (Conflict, Resolved) => Some(Modified),
            (Conflict, Accepted) | (LocalOnly | Synced | Modified, Resolved) => None,
        }
    }

    #[must_use]
    pub fn is_pending(self) -> bool {
        self != PlaygroundSyncStatus::Synced
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PlaygroundSyncStatus::LocalOnly => "local_only",
            PlaygroundSyncStatus::Synced => "synced",
            PlaygroundSyncStatus::Modified => "modified",
            PlaygroundSyncStatus::Conflict => "conflict",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local_only" => Some(PlaygroundSyncStatus::LocalOnly),
            "synced" => Some(PlaygroundSyncStatus::Synced),
            "modified" => Some(PlaygroundSyncStatus::Modified),
            "conflict" => Some(PlaygroundSyncStatus::Conflict),
            _ => None,
        }
    }
}

impl CommitSyncStatus {
    /// Commits only ever move forward, and accepting twice is a no-op.
    #[must_use]
    pub fn accept(self) -> Self {
        CommitSyncStatus::Synced
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommitSyncStatus::LocalOnly => "local_only",
            CommitSyncStatus::Synced => "synced",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local_only" => Some(CommitSyncStatus::LocalOnly),
            "synced" => Some(CommitSyncStatus::Synced),
            _ => None,
        }
    }
}

impl fmt::Display for PlaygroundSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CommitSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown sync status '{s}'").into()))
            }
        }
    };
}

sql_text_enum!(PlaygroundSyncStatus);
sql_text_enum!(CommitSyncStatus);

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [PlaygroundSyncStatus; 4] = [
        PlaygroundSyncStatus::LocalOnly,
        PlaygroundSyncStatus::Synced,
        PlaygroundSyncStatus::Modified,
        PlaygroundSyncStatus::Conflict,
    ];
    const EVENTS: [SyncEvent; 4] = [
        SyncEvent::Accepted,
        SyncEvent::Edited,
        SyncEvent::Diverged,
        SyncEvent::Resolved,
    ];

    #[test]
    fn test_transition_table() {
        use PlaygroundSyncStatus::*;
        use SyncEvent::*;

        assert_eq!(LocalOnly.apply(Accepted), Some(Synced));
        assert_eq!(LocalOnly.apply(Edited), Some(LocalOnly));
        assert_eq!(Synced.apply(Edited), Some(Modified));
        assert_eq!(Modified.apply(Accepted), Some(Synced));
        assert_eq!(Modified.apply(Diverged), Some(Conflict));
        assert_eq!(Conflict.apply(Resolved), Some(Modified));
        assert_eq!(Conflict.apply(Accepted), None);
        assert_eq!(Synced.apply(Resolved), None);
    }

    #[test]
    fn test_local_only_is_never_a_target_from_synced_states() {
        for from in ALL {
            for event in EVENTS {
                if from != PlaygroundSyncStatus::LocalOnly {
                    assert_ne!(from.apply(event), Some(PlaygroundSyncStatus::LocalOnly));
                }
            }
        }
    }

    #[test]
    fn test_conflict_only_leaves_through_resolution() {
        for event in EVENTS {
            let next = PlaygroundSyncStatus::Conflict.apply(event);
            if event != SyncEvent::Resolved {
                assert!(matches!(next, None | Some(PlaygroundSyncStatus::Conflict)));
            }
        }
    }

    #[test]
    fn test_commit_accept_is_idempotent() {
        let synced = CommitSyncStatus::LocalOnly.accept();
        assert_eq!(synced, CommitSyncStatus::Synced);
        assert_eq!(synced.accept(), CommitSyncStatus::Synced);
    }

    #[test]
    fn test_status_text_round_trip() {
        for status in ALL {
            assert_eq!(PlaygroundSyncStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PlaygroundSyncStatus::parse("bogus"), None);
    }
}
