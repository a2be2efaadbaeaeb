use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ClientError, ClientResult};
use super::http::{ApiClient, Connectivity};
use super::hydration::{CacheKey, HydrationCache};
use super::local::{
    CommitSyncStatus, LocalCommit, LocalOfflineStore, LocalPlayground, LocalPlaygroundUpdate,
    PlaygroundSyncStatus, SyncEvent,
};
use super::optimistic::Optimistic;
use super::reconcile::{InitialData, merge_initial_data};
use super::route::{Route, route_from_url};
use crate::config::ClientConfig;
use crate::types::{Commit, FileEntry, Privacy, User, files_digest};
use crate::vcs::{CommitCreated, ForkCreated, ForkRequest, NewCommit, NewPlayground, PlaygroundDetail, StarToggled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarState {
    pub starred: bool,
    pub stars: i64,
}

impl StarState {
    #[must_use]
    pub fn toggled(&self) -> Self {
        Self {
            starred: !self.starred,
            stars: if self.starred {
                (self.stars - 1).max(0)
            } else {
                self.stars + 1
            },
        }
    }
}

impl From<&PlaygroundDetail> for StarState {
    fn from(detail: &PlaygroundDetail) -> Self {
        let stars = detail.stars.parse().unwrap_or_else(|_| {
            tracing::warn!(stars = %detail.stars, "unparseable star count");
            0
        });
        Self {
            starred: detail.is_starred,
            stars,
        }
    }
}

impl From<&StarToggled> for StarState {
    fn from(toggled: &StarToggled) -> Self {
        Self {
            starred: toggled.starred,
            stars: toggled.stars,
        }
    }
}

/// The playground currently loaded into the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPlayground {
    /// Server identity; `None` until the server has accepted the playground.
    pub server_hash: Option<String>,
    /// Offline-store key once local work has been queued.
    pub local_hash: Option<String>,
    pub name: Option<String>,
    /// Latest server commit the working files descend from.
    pub base_commit_id: Option<String>,
    /// Commit (server or local) the working files were last saved as.
    pub head_id: Option<String>,
    pub files: Vec<FileEntry>,
    pub active_file: Option<String>,
    saved_digest: String,
}

impl OpenPlayground {
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        files_digest(&self.files) != self.saved_digest
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content.as_str())
    }
}

/// Where `hydrate` found the commit it loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateSource {
    /// The payload embedded by the server.
    Initial,
    Cache,
    Server,
    /// The route does not pin a commit.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Committed(CommitCreated),
    /// Stored in the offline queue; pushed by `sync_pending`.
    Queued { local_hash: String, commit_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed_commits: usize,
    /// Server hashes that are now fully synced.
    pub synced: Vec<String>,
    /// Local hashes left in conflict.
    pub conflicts: Vec<String>,
}

/// Keeps the editor's working copy consistent with the server, the offline
/// queue and the hydration cache.
pub struct Workspace {
    api: ApiClient,
    offline: LocalOfflineStore,
    cache: HydrationCache,
    route: Option<Route>,
    user: Option<User>,
    open: Option<OpenPlayground>,
    star: Optimistic<StarState>,
    warnings: Vec<String>,
}

impl Workspace {
    pub fn new(api: ApiClient, offline: LocalOfflineStore, cache: HydrationCache) -> Self {
        Self {
            api,
            offline,
            cache,
            route: None,
            user: None,
            open: None,
            star: Optimistic::new(StarState::default()),
            warnings: Vec::new(),
        }
    }

    /// Opens the local databases under the configured data dir.
    pub fn from_config(config: &ClientConfig, connectivity: Connectivity) -> ClientResult<Self> {
        let api = ApiClient::new(config, connectivity)?;
        let offline = LocalOfflineStore::open(config.offline_db_path())?;
        let cache = HydrationCache::open(config.hydration_db_path())?;
        Ok(Self::new(api, offline, cache))
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn offline_store(&self) -> &LocalOfflineStore {
        &self.offline
    }

    #[must_use]
    pub fn hydration_cache(&self) -> &HydrationCache {
        &self.cache
    }

    #[must_use]
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn current(&self) -> Option<&OpenPlayground> {
        self.open.as_ref()
    }

    #[must_use]
    pub fn star(&self) -> StarState {
        *self.star.get()
    }

    /// Messages meant for the user, oldest first.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn warn_user(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    fn clear(&mut self) {
        self.open = None;
        self.star.set(StarState::default());
    }

    /// Clears a playground or commit the server no longer has.
    fn handle_missing(&mut self, hash: &str, commit_id: Option<&str>) {
        self.clear();
        match commit_id {
            Some(id) => {
                self.cache.remove(&CacheKey::Commit(id.to_string()));
                self.warn_user(format!("Commit {id} of playground {hash} was not found"));
            }
            None => {
                self.cache.clear_playground(hash);
                self.warn_user(format!("Playground {hash} was not found"));
            }
        }
    }

    /// Loads the page for `url`, preferring the freshest of the server
    /// payload and the local cache, and fetching only when neither fits.
    pub async fn hydrate(
        &mut self,
        url: &str,
        initial: Option<InitialData>,
    ) -> ClientResult<HydrateSource> {
        let url_route = route_from_url(url);
        if url_route.is_none() {
            tracing::debug!(url, "url does not name a known route");
        }

        let lookup_route = url_route
            .clone()
            .or_else(|| initial.as_ref().and_then(|i| i.route.clone()));
        let cached = lookup_route
            .as_ref()
            .and_then(|route| self.cache.get_for_route(route));
        let initial_commit = initial.as_ref().and_then(|i| i.commit.clone());

        let merged = merge_initial_data(url_route, initial, cached.map(InitialData::from));
        self.route = merged.route.clone();
        self.user = merged.user;

        match (merged.route, merged.commit) {
            (route, Some(commit)) => {
                let source = if initial_commit.as_ref() == Some(&commit) {
                    HydrateSource::Initial
                } else {
                    HydrateSource::Cache
                };
                if source == HydrateSource::Initial {
                    let latest = matches!(route, Some(Route::Playground { .. }));
                    self.cache
                        .put_commit(&commit, route.as_ref(), self.user.as_ref(), latest);
                }
                self.materialize(&commit);
                self.refresh_detail(&commit.playground_hash).await?;
                Ok(source)
            }
            (Some(Route::Playground { playground_id }), None) => {
                self.open_playground(&playground_id).await?;
                Ok(HydrateSource::Server)
            }
            (
                Some(Route::Commit {
                    playground_id,
                    commit_id,
                }),
                None,
            ) => {
                self.open_commit(&playground_id, &commit_id).await?;
                Ok(HydrateSource::Server)
            }
            _ => {
                self.clear();
                Ok(HydrateSource::Empty)
            }
        }
    }

    /// Loads a server commit into the editor. On a playground route the
    /// newest queued local commit built on top of it wins; a commit route
    /// always shows exactly the pinned commit.
    fn materialize(&mut self, commit: &Commit) {
        let pinned = matches!(self.route, Some(Route::Commit { .. }));
        let local = self
            .offline
            .get_by_server_hash(&commit.playground_hash)
            .filter(|pg| pg.sync_status.is_pending());
        let local_head = local
            .as_ref()
            .filter(|_| !pinned)
            .and_then(|pg| self.offline.get_latest_by_playground(&pg.hash))
            .filter(|c| c.sync_status == CommitSyncStatus::LocalOnly);

        let (files, active_file, head_id) = match local_head {
            Some(head) => (head.files, head.active_file, head.id),
            None => (
                commit.files.clone(),
                commit.active_file.clone(),
                commit.id.clone(),
            ),
        };
        let base_commit_id = local
            .as_ref()
            .and_then(|pg| pg.base_commit_id.clone())
            .or_else(|| Some(commit.id.clone()));

        self.open = Some(OpenPlayground {
            server_hash: Some(commit.playground_hash.clone()),
            local_hash: local.map(|pg| pg.hash),
            name: None,
            base_commit_id,
            head_id: Some(head_id),
            saved_digest: files_digest(&files),
            files,
            active_file,
        });
    }

    /// Refreshes name and star state. A playground the server no longer has
    /// clears the workspace; other failures keep what is shown.
    async fn refresh_detail(&mut self, hash: &str) -> ClientResult<()> {
        match self.api.get_playground(hash).await {
            Ok(detail) => {
                self.star.set(StarState::from(&detail));
                if let Some(open) = self.open.as_mut() {
                    open.name = detail.playground.name;
                }
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.handle_missing(hash, None);
                Err(e)
            }
            Err(e) => {
                tracing::debug!(playground = hash, error = %e, "could not refresh playground detail");
                Ok(())
            }
        }
    }

    /// Opens a playground at its latest commit. Falls back to the cache when
    /// the server cannot be reached.
    pub async fn open_playground(&mut self, hash: &str) -> ClientResult<()> {
        let fetched = async {
            let detail = self.api.get_playground(hash).await?;
            let latest = self.api.latest_commit(hash).await?;
            Ok::<_, ClientError>((detail, latest))
        }
        .await;

        let route = Route::Playground {
            playground_id: hash.to_string(),
        };

        match fetched {
            Ok((detail, Some(commit))) => {
                self.route = Some(route);
                self.cache
                    .put_commit(&commit, self.route.as_ref(), self.user.as_ref(), true);
                self.materialize(&commit);
                self.star.set(StarState::from(&detail));
                if let Some(open) = self.open.as_mut() {
                    open.name = detail.playground.name;
                }
                Ok(())
            }
            Ok((_, None)) => {
                self.handle_missing(hash, None);
                Err(ClientError::Api {
                    status: 404,
                    message: "Playground has no commits".to_string(),
                })
            }
            Err(e) if e.is_not_found() => {
                self.handle_missing(hash, None);
                Err(e)
            }
            Err(e) if e.is_unreachable() => {
                let Some(entry) = self.cache.get_for_route(&route) else {
                    return Err(e);
                };
                tracing::info!(playground = hash, error = %e, "server unreachable, opening cached copy");
                self.route = Some(route);
                self.materialize(&entry.commit);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Opens one specific commit of a playground.
    pub async fn open_commit(&mut self, hash: &str, commit_id: &str) -> ClientResult<()> {
        let route = Route::Commit {
            playground_id: hash.to_string(),
            commit_id: commit_id.to_string(),
        };

        match self.api.get_commit(hash, commit_id).await {
            Ok(commit) => {
                self.route = Some(route);
                self.cache
                    .put_commit(&commit, self.route.as_ref(), self.user.as_ref(), false);
                self.materialize(&commit);
                self.refresh_detail(hash).await
            }
            Err(e) if e.is_not_found() => {
                self.handle_missing(hash, Some(commit_id));
                Err(e)
            }
            Err(e) if e.is_unreachable() => {
                let Some(entry) = self.cache.get_for_route(&route) else {
                    return Err(e);
                };
                self.route = Some(route);
                self.materialize(&entry.commit);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Starts an unsaved playground.
    pub fn start_new(&mut self, name: Option<String>, files: Vec<FileEntry>) {
        let active_file = files.first().map(|f| f.path.clone());
        self.route = Some(Route::Home);
        self.star.set(StarState::default());
        self.open = Some(OpenPlayground {
            server_hash: None,
            local_hash: None,
            name,
            base_commit_id: None,
            head_id: None,
            saved_digest: files_digest(&[]),
            files,
            active_file,
        });
    }

    pub fn write_file(&mut self, path: &str, content: &str) -> bool {
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        match open.files.iter_mut().find(|f| f.path == path) {
            Some(file) => file.content = content.to_string(),
            None => open.files.push(FileEntry::new(path, content)),
        }
        true
    }

    pub fn remove_file(&mut self, path: &str) -> bool {
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        let before = open.files.len();
        open.files.retain(|f| f.path != path);
        if open.active_file.as_deref() == Some(path) {
            open.active_file = None;
        }
        open.files.len() != before
    }

    pub fn set_active_file(&mut self, path: &str) -> bool {
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        if !open.files.iter().any(|f| f.path == path) {
            return false;
        }
        open.active_file = Some(path.to_string());
        true
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.open.as_ref().is_some_and(OpenPlayground::is_dirty)
    }

    fn has_queued_work(&self, open: &OpenPlayground) -> bool {
        open.local_hash
            .as_deref()
            .and_then(|hash| self.offline.get_playground(hash))
            .is_some_and(|pg| pg.sync_status.is_pending())
    }

    /// Saves the working files as a new commit. Goes to the server when
    /// possible, otherwise into the offline queue. Queued work is never
    /// overtaken by a direct save.
    pub async fn save(&mut self, message: &str) -> ClientResult<SaveOutcome> {
        let open = self
            .open
            .clone()
            .ok_or_else(|| ClientError::Invalid("no playground is open".to_string()))?;
        let req = NewCommit {
            message: message.to_string(),
            files: open.files.clone(),
            active_file: open.active_file.clone(),
        };
        req.validate()?;

        if self.api.connectivity().is_online() && !self.has_queued_work(&open) {
            let result = match &open.server_hash {
                Some(hash) => self.api.create_commit(hash, &req).await,
                None => {
                    self.api
                        .create_playground(&NewPlayground {
                            name: open.name.clone(),
                            description: None,
                            message: req.message.clone(),
                            files: req.files.clone(),
                            active_file: req.active_file.clone(),
                            privacy: None,
                        })
                        .await
                }
            };

            match result {
                Ok(created) => {
                    self.record_saved(&open, &created, req);
                    return Ok(SaveOutcome::Committed(created));
                }
                Err(e) if e.is_unreachable() => {
                    tracing::warn!(error = %e, "save could not reach the server, queueing");
                }
                Err(e) if e.is_not_found() => {
                    if let Some(hash) = &open.server_hash {
                        self.handle_missing(hash, None);
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        self.queue_commit(&open, req)
    }

    fn record_saved(&mut self, open: &OpenPlayground, created: &CommitCreated, req: NewCommit) {
        let commit = Commit {
            id: created.commit_id.clone(),
            playground_hash: created.playground_hash.clone(),
            parent_id: created.parent_id.clone(),
            message: created.message.clone(),
            files: req.files,
            active_file: req.active_file,
            created_at: created.created_at,
            timestamp: created.created_at.timestamp_millis(),
            user_id: self.user.as_ref().map(|u| u.id.clone()),
        };

        if open.server_hash.is_none() {
            self.route = Some(Route::Playground {
                playground_id: created.playground_hash.clone(),
            });
        }
        self.cache
            .put_commit(&commit, self.route.as_ref(), self.user.as_ref(), true);

        if let Some(local_hash) = &open.local_hash {
            self.offline.update_playground(
                local_hash,
                LocalPlaygroundUpdate {
                    base_commit_id: Some(commit.id.clone()),
                    ..Default::default()
                },
            );
        }

        if let Some(current) = self.open.as_mut() {
            current.server_hash = Some(commit.playground_hash.clone());
            current.base_commit_id = Some(commit.id.clone());
            current.head_id = Some(commit.id.clone());
            current.saved_digest = commit.digest();
        }
    }

    fn queue_commit(&mut self, open: &OpenPlayground, req: NewCommit) -> ClientResult<SaveOutcome> {
        let now = Utc::now();
        let local = match open
            .local_hash
            .as_deref()
            .and_then(|hash| self.offline.get_playground(hash))
        {
            Some(pg) => pg,
            None => {
                let pg = LocalPlayground {
                    hash: open
                        .server_hash
                        .clone()
                        .unwrap_or_else(|| format!("local-{}", Uuid::new_v4())),
                    server_hash: open.server_hash.clone(),
                    name: open.name.clone(),
                    description: None,
                    privacy: Privacy::default(),
                    base_commit_id: open.base_commit_id.clone(),
                    sync_status: if open.server_hash.is_some() {
                        PlaygroundSyncStatus::Synced
                    } else {
                        PlaygroundSyncStatus::LocalOnly
                    },
                    created_at: now,
                    updated_at: now,
                };
                if !self.offline.save_playground(&pg) {
                    return Err(ClientError::LocalStore(
                        "could not record playground for offline sync".to_string(),
                    ));
                }
                pg
            }
        };

        let previous = self.offline.get_latest_by_playground(&local.hash);
        let now_ms = now.timestamp_millis();
        let timestamp = previous
            .as_ref()
            .map_or(now_ms, |p| now_ms.max(p.timestamp + 1));
        let parent_id = previous
            .map(|p| p.id)
            .or_else(|| local.base_commit_id.clone());

        let commit = LocalCommit {
            id: Uuid::new_v4().to_string(),
            playground_hash: local.hash.clone(),
            parent_id,
            message: req.message.trim().to_string(),
            files: req.files,
            active_file: req.active_file,
            timestamp,
            created_at: now,
            sync_status: CommitSyncStatus::LocalOnly,
            server_id: None,
        };
        if !self.offline.save_commit(&commit) {
            return Err(ClientError::LocalStore(
                "could not queue commit for offline sync".to_string(),
            ));
        }
        self.offline.apply_event(&local.hash, SyncEvent::Edited);

        tracing::info!(
            playground = %local.hash,
            commit = %commit.id,
            "commit queued for sync"
        );

        if let Some(current) = self.open.as_mut() {
            current.local_hash = Some(local.hash.clone());
            current.head_id = Some(commit.id.clone());
            current.saved_digest = files_digest(&commit.files);
        }

        Ok(SaveOutcome::Queued {
            local_hash: local.hash,
            commit_id: commit.id,
        })
    }

    /// Pushes queued playgrounds and commits. A playground whose server
    /// history moved past its base is marked `conflict` and left alone.
    pub async fn sync_pending(&mut self) -> ClientResult<SyncReport> {
        if !self.api.connectivity().is_online() {
            return Err(ClientError::Offline(
                "sync requires a connection".to_string(),
            ));
        }

        let mut report = SyncReport::default();
        for pg in self.offline.list_pending() {
            match pg.sync_status {
                PlaygroundSyncStatus::Conflict => report.conflicts.push(pg.hash.clone()),
                PlaygroundSyncStatus::LocalOnly => self.push_new(&pg, &mut report).await?,
                PlaygroundSyncStatus::Synced | PlaygroundSyncStatus::Modified => {
                    self.push_onto_server(&pg, &mut report).await?;
                }
            }
        }

        tracing::info!(
            pushed = report.pushed_commits,
            synced = report.synced.len(),
            conflicts = report.conflicts.len(),
            "sync finished"
        );
        Ok(report)
    }

    fn unsynced_commits(&self, local_hash: &str) -> Vec<LocalCommit> {
        self.offline
            .list_by_playground(local_hash)
            .into_iter()
            .filter(|c| c.sync_status == CommitSyncStatus::LocalOnly)
            .collect()
    }

    async fn push_new(&mut self, pg: &LocalPlayground, report: &mut SyncReport) -> ClientResult<()> {
        let pending = self.unsynced_commits(&pg.hash);
        let Some(first) = pending.first() else {
            tracing::warn!(playground = %pg.hash, "local playground has no commits to push");
            return Ok(());
        };

        let created = self
            .api
            .create_playground(&NewPlayground {
                name: pg.name.clone(),
                description: pg.description.clone(),
                message: first.message.clone(),
                files: first.files.clone(),
                active_file: first.active_file.clone(),
                privacy: Some(pg.privacy),
            })
            .await?;

        self.offline.mark_commit_synced(&first.id, &created.commit_id);
        self.offline.update_playground(
            &pg.hash,
            LocalPlaygroundUpdate {
                server_hash: Some(created.playground_hash.clone()),
                base_commit_id: Some(created.commit_id.clone()),
                ..Default::default()
            },
        );
        self.offline.apply_event(&pg.hash, SyncEvent::Accepted);
        report.pushed_commits += 1;
        self.adopt_server_identity(&pg.hash, &created.playground_hash, &created.commit_id);

        if pending.len() > 1 {
            self.offline.apply_event(&pg.hash, SyncEvent::Edited);
            if let Some(refreshed) = self.offline.get_playground(&pg.hash) {
                return self.push_onto_server(&refreshed, report).await;
            }
        }

        report.synced.push(created.playground_hash);
        Ok(())
    }

    async fn push_onto_server(
        &mut self,
        pg: &LocalPlayground,
        report: &mut SyncReport,
    ) -> ClientResult<()> {
        let Some(server_hash) = pg.server_hash.clone() else {
            tracing::warn!(playground = %pg.hash, "pending playground has no server identity");
            return Ok(());
        };

        let server_latest = match self.api.list_commits(&server_hash).await {
            Ok(commits) => commits.first().map(|c| c.id.clone()),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if server_latest.is_none() || server_latest != pg.base_commit_id {
            self.offline.apply_event(&pg.hash, SyncEvent::Diverged);
            report.conflicts.push(pg.hash.clone());
            let is_open = self
                .open
                .as_ref()
                .is_some_and(|o| o.local_hash.as_deref() == Some(pg.hash.as_str()));
            if is_open {
                self.warn_user(format!(
                    "Playground {server_hash} changed on the server while you were offline"
                ));
            } else {
                tracing::warn!(playground = %server_hash, "server history diverged from local queue");
            }
            return Ok(());
        }

        let mut head = pg.base_commit_id.clone();
        for commit in self.unsynced_commits(&pg.hash) {
            let created = self
                .api
                .create_commit(
                    &server_hash,
                    &NewCommit {
                        message: commit.message.clone(),
                        files: commit.files.clone(),
                        active_file: commit.active_file.clone(),
                    },
                )
                .await?;

            self.offline.mark_commit_synced(&commit.id, &created.commit_id);
            self.offline.update_playground(
                &pg.hash,
                LocalPlaygroundUpdate {
                    base_commit_id: Some(created.commit_id.clone()),
                    ..Default::default()
                },
            );
            report.pushed_commits += 1;
            head = Some(created.commit_id);
        }

        self.offline.apply_event(&pg.hash, SyncEvent::Accepted);
        if let Some(head) = head {
            self.adopt_server_identity(&pg.hash, &server_hash, &head);
        }
        report.synced.push(server_hash);
        Ok(())
    }

    fn adopt_server_identity(&mut self, local_hash: &str, server_hash: &str, head: &str) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if open.local_hash.as_deref() != Some(local_hash) {
            return;
        }
        open.server_hash = Some(server_hash.to_string());
        open.base_commit_id = Some(head.to_string());

        if !matches!(self.route, Some(Route::Playground { .. } | Route::Commit { .. })) {
            self.route = Some(Route::Playground {
                playground_id: server_hash.to_string(),
            });
        }
    }

    /// Rebases a conflicted queue onto the server's current latest commit.
    /// The next sync then pushes the local commits on top of it.
    pub async fn resolve_conflict(&mut self, local_hash: &str) -> ClientResult<PlaygroundSyncStatus> {
        let pg = self
            .offline
            .get_playground(local_hash)
            .ok_or_else(|| ClientError::Invalid(format!("unknown local playground {local_hash}")))?;
        if pg.sync_status != PlaygroundSyncStatus::Conflict {
            return Err(ClientError::Invalid(format!(
                "playground {local_hash} is not in conflict"
            )));
        }
        let server_hash = pg.server_hash.ok_or_else(|| {
            ClientError::Invalid(format!("playground {local_hash} was never synced"))
        })?;

        let latest = self
            .api
            .list_commits(&server_hash)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Api {
                status: 404,
                message: "Playground has no commits".to_string(),
            })?;

        self.offline.update_playground(
            local_hash,
            LocalPlaygroundUpdate {
                base_commit_id: Some(latest.id.clone()),
                ..Default::default()
            },
        );
        let status = self
            .offline
            .apply_event(local_hash, SyncEvent::Resolved)
            .ok_or_else(|| ClientError::LocalStore("could not record resolution".to_string()))?;

        if let Some(open) = self.open.as_mut() {
            if open.local_hash.as_deref() == Some(local_hash) {
                open.base_commit_id = Some(latest.id);
            }
        }
        Ok(status)
    }

    /// Forks the open playground and switches to the fork.
    pub async fn fork(&mut self, name: Option<String>) -> ClientResult<ForkCreated> {
        let hash = self
            .open
            .as_ref()
            .and_then(|o| o.server_hash.clone())
            .ok_or_else(|| ClientError::Invalid("only saved playgrounds can be forked".to_string()))?;

        let created = match self.api.fork(&hash, &ForkRequest { name }).await {
            Ok(created) => created,
            Err(e) if e.is_not_found() => {
                self.handle_missing(&hash, None);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.open_playground(&created.playground_id).await?;
        Ok(created)
    }

    /// Toggles the star optimistically. On failure the star state returns to
    /// exactly what it was before the toggle.
    pub async fn toggle_star(&mut self) -> ClientResult<StarState> {
        let hash = self
            .open
            .as_ref()
            .and_then(|o| o.server_hash.clone())
            .ok_or_else(|| ClientError::Invalid("only saved playgrounds can be starred".to_string()))?;

        let api = self.api.clone();
        let target = hash.clone();
        let result = self
            .star
            .apply(
                StarState::toggled,
                async move { api.toggle_star(&target).await },
                |toggled: &StarToggled| StarState::from(toggled),
            )
            .await;

        match result {
            Ok(_) => Ok(*self.star.get()),
            Err(e) => {
                if e.is_not_found() {
                    self.handle_missing(&hash, None);
                }
                Err(e)
            }
        }
    }

    pub fn close(&self) {
        self.offline.close();
        self.cache.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> Workspace {
        let config = ClientConfig::new("http://127.0.0.1:9");
        let api = ApiClient::new(&config, Connectivity::new(false)).unwrap();
        Workspace::new(
            api,
            LocalOfflineStore::open_in_memory().unwrap(),
            HydrationCache::open_in_memory().unwrap(),
        )
    }

    #[test]
    fn test_edits_track_dirty_state() {
        let mut ws = workspace();
        assert!(!ws.write_file("a.sql", "x"));

        ws.start_new(None, vec![FileEntry::new("a.sql", "select 1;")]);
        assert!(ws.is_dirty());
        assert_eq!(ws.current().unwrap().active_file.as_deref(), Some("a.sql"));

        assert!(ws.write_file("b.sql", "select 2;"));
        assert!(ws.set_active_file("b.sql"));
        assert!(!ws.set_active_file("missing.sql"));
        assert!(ws.remove_file("b.sql"));
        assert!(ws.current().unwrap().active_file.is_none());
        assert!(!ws.remove_file("b.sql"));
    }

    #[tokio::test]
    async fn test_offline_save_of_new_playground_is_queued() {
        let mut ws = workspace();
        ws.start_new(
            Some("draft".to_string()),
            vec![FileEntry::new("a.sql", "select 1;")],
        );

        let outcome = ws.save("first").await.unwrap();
        let SaveOutcome::Queued {
            local_hash,
            commit_id,
        } = outcome
        else {
            panic!("expected queued save");
        };
        assert!(local_hash.starts_with("local-"));
        assert!(!ws.is_dirty());

        let pg = ws.offline_store().get_playground(&local_hash).unwrap();
        assert_eq!(pg.sync_status, PlaygroundSyncStatus::LocalOnly);
        assert_eq!(pg.name.as_deref(), Some("draft"));

        ws.write_file("a.sql", "select 2;");
        let second = ws.save("second").await.unwrap();
        let SaveOutcome::Queued {
            commit_id: second_id,
            ..
        } = second
        else {
            panic!("expected queued save");
        };

        let queued = ws.offline_store().get_commit(&second_id).unwrap();
        assert_eq!(queued.parent_id.as_deref(), Some(commit_id.as_str()));
        let first = ws.offline_store().get_commit(&commit_id).unwrap();
        assert!(queued.timestamp > first.timestamp);
    }

    #[tokio::test]
    async fn test_sync_refused_offline() {
        let mut ws = workspace();
        assert!(matches!(
            ws.sync_pending().await,
            Err(ClientError::Offline(_))
        ));
    }

    #[tokio::test]
    async fn test_hydrate_home_is_empty() {
        let mut ws = workspace();
        let source = ws.hydrate("https://example.com/", None).await.unwrap();
        assert_eq!(source, HydrateSource::Empty);
        assert!(ws.current().is_none());
        assert_eq!(ws.route(), Some(&Route::Home));
    }

    #[test]
    fn test_star_toggle_projection() {
        let off = StarState {
            starred: false,
            stars: 0,
        };
        assert_eq!(
            off.toggled(),
            StarState {
                starred: true,
                stars: 1
            }
        );
        assert_eq!(off.toggled().toggled(), off);
    }
}
