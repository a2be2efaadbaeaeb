//! Sync client: HTTP access to a playvault server plus the local state that
//! keeps a workspace usable offline.
//!
//! - [`http::ApiClient`] talks to the server and honours connectivity,
//!   cancellation and per-request timeouts.
//! - [`local::LocalOfflineStore`] queues commits made without a connection.
//! - [`hydration::HydrationCache`] remembers the last commit shown per route.
//! - [`workspace::Workspace`] ties these together for an editor.

pub mod error;
pub mod http;
pub mod hydration;
pub mod local;
pub mod optimistic;
pub mod reconcile;
pub mod route;
pub mod workspace;

pub use error::{ClientError, ClientResult};
pub use http::{ApiClient, Connectivity};
pub use hydration::{CacheKey, CachedCommitEntry, HydrationCache};
pub use local::{
    CommitSyncStatus, LocalCommit, LocalOfflineStore, LocalPlayground, PlaygroundSyncStatus,
    SyncEvent,
};
pub use optimistic::{Optimistic, Pending};
pub use reconcile::{InitialData, merge_initial_data, select_commit};
pub use route::{Route, route_from_url};
pub use workspace::{HydrateSource, OpenPlayground, SaveOutcome, StarState, SyncReport, Workspace};
