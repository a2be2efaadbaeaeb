use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::{ClientError, ClientResult};
use crate::config::ClientConfig;
use crate::server::response::ApiResponse;
use crate::types::{Commit, CommitSummary, Page, Playground, PlaygroundSummary};
use crate::vcs::validation::validate_files;
use crate::vcs::{
    CommitCreated, CommitDiff, CommitHistory, ForkCreated, ForkRequest, ListParams, NewCommit,
    NewPlayground, PlaygroundDetail, StarToggled, UpdatePlayground,
};

/// Shared online/offline flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        let was = self.0.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!(online, "connectivity changed");
        }
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Async client for the playground API. Mutating requests are refused while
/// offline; every request is bounded by the configured timeout and aborts
/// when the client's cancellation token fires.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    connectivity: Connectivity,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, connectivity: Connectivity) -> ClientResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            token: config.session_token.clone(),
            timeout: config.request_timeout(),
            connectivity,
            cancel: CancellationToken::new(),
        })
    }

    /// Returns a client whose requests abort when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<(StatusCode, Vec<u8>)> {
        let mutating = !matches!(method, Method::GET | Method::HEAD);
        if mutating && !self.connectivity.is_online() {
            return Err(ClientError::Offline(format!(
                "{method} {path} refused while offline"
            )));
        }
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let url = format!("{}/api{}", self.base_url, path);
        let mut request = self.client.request(method, &url).timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body.to_vec()))
        };

        let (status, body) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            result = exchange => result.map_err(|e| self.classify(&e, path))?,
        };

        tracing::debug!(path, status = status.as_u16(), "api response");
        Ok((status, body))
    }

    fn classify(&self, err: &reqwest::Error, path: &str) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout
        } else if !self.connectivity.is_online() {
            ClientError::Offline(format!("GET {path} failed while offline"))
        } else {
            ClientError::Network(err.to_string())
        }
    }

    fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
        let message = serde_json::from_slice::<ApiResponse<Value>>(body)
            .ok()
            .and_then(|r| r.error)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| "Server error (no details provided)".to_string());
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Decodes a `{data, error}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<T> {
        let (status, bytes) = self.execute(method, path, body).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &bytes));
        }
        let envelope: ApiResponse<T> =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))?;
        envelope
            .data
            .ok_or_else(|| ClientError::Decode("Server returned an empty response".to_string()))
    }

    /// Decodes a bare (unwrapped) body, used by list endpoints.
    async fn call_raw<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let (status, bytes) = self.execute(Method::GET, path, None).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn encode<B: Serialize>(body: &B) -> ClientResult<Value> {
        serde_json::to_value(body).map_err(|e| ClientError::Invalid(e.to_string()))
    }

    pub async fn get_playground(&self, hash: &str) -> ClientResult<PlaygroundDetail> {
        let detail: PlaygroundDetail = self
            .call(Method::GET, &format!("/playgrounds/{}", encode_segment(hash)), None)
            .await?;
        if detail.playground.hash != hash {
            return Err(ClientError::Decode(format!(
                "requested playground {hash}, received {}",
                detail.playground.hash
            )));
        }
        Ok(detail)
    }

    pub async fn list_playgrounds(&self, params: &ListParams) -> ClientResult<Page<PlaygroundSummary>> {
        self.call_raw(&format!("/playgrounds{}", list_query(params))).await
    }

    pub async fn search_playgrounds(
        &self,
        params: &ListParams,
    ) -> ClientResult<Page<PlaygroundSummary>> {
        self.call_raw(&format!("/playgrounds/search{}", list_query(params)))
            .await
    }

    pub async fn list_user_playgrounds(
        &self,
        username: &str,
        params: &ListParams,
    ) -> ClientResult<Page<PlaygroundSummary>> {
        self.call_raw(&format!(
            "/user/{}{}",
            encode_segment(username),
            list_query(params)
        ))
        .await
    }

    pub async fn create_playground(&self, req: &NewPlayground) -> ClientResult<CommitCreated> {
        validate_files(&req.files, req.active_file.as_deref())?;
        self.call(Method::POST, "/playgrounds", Some(Self::encode(req)?))
            .await
    }

    pub async fn update_playground(
        &self,
        hash: &str,
        req: &UpdatePlayground,
    ) -> ClientResult<Playground> {
        self.call(
            Method::PUT,
            &format!("/playgrounds/{}", encode_segment(hash)),
            Some(Self::encode(req)?),
        )
        .await
    }

    pub async fn delete_playground(&self, hash: &str) -> ClientResult<()> {
        let (status, bytes) = self
            .execute(
                Method::DELETE,
                &format!("/playgrounds/{}", encode_segment(hash)),
                None,
            )
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::api_error(status, &bytes))
        }
    }

    pub async fn toggle_star(&self, hash: &str) -> ClientResult<StarToggled> {
        self.call(
            Method::POST,
            &format!("/playgrounds/{}/star", encode_segment(hash)),
            None,
        )
        .await
    }

    pub async fn fork(&self, hash: &str, req: &ForkRequest) -> ClientResult<ForkCreated> {
        self.call(
            Method::POST,
            &format!("/playgrounds/{}/fork", encode_segment(hash)),
            Some(Self::encode(req)?),
        )
        .await
    }

    pub async fn create_commit(&self, hash: &str, req: &NewCommit) -> ClientResult<CommitCreated> {
        req.validate()?;
        self.call(
            Method::POST,
            &format!("/playgrounds/{}/commits", encode_segment(hash)),
            Some(Self::encode(req)?),
        )
        .await
    }

    pub async fn list_commits(&self, hash: &str) -> ClientResult<Vec<CommitSummary>> {
        self.call(
            Method::GET,
            &format!("/playgrounds/{}/commits", encode_segment(hash)),
            None,
        )
        .await
    }

    /// Fetches a commit and checks it is the one asked for and well formed.
    pub async fn get_commit(&self, hash: &str, commit_id: &str) -> ClientResult<Commit> {
        let commit: Commit = self
            .call(
                Method::GET,
                &format!(
                    "/playgrounds/{}/commits/{}",
                    encode_segment(hash),
                    encode_segment(commit_id)
                ),
                None,
            )
            .await?;

        if commit.id != commit_id || commit.playground_hash != hash {
            return Err(ClientError::Decode(format!(
                "requested commit {commit_id} of {hash}, received {} of {}",
                commit.id, commit.playground_hash
            )));
        }
        validate_files(&commit.files, commit.active_file.as_deref())
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(commit)
    }

    pub async fn commit_history(
        &self,
        hash: &str,
        commit_id: &str,
        limit: Option<usize>,
    ) -> ClientResult<CommitHistory> {
        let query = limit.map(|l| format!("?limit={l}")).unwrap_or_default();
        self.call(
            Method::GET,
            &format!(
                "/playgrounds/{}/commits/{}/history{query}",
                encode_segment(hash),
                encode_segment(commit_id)
            ),
            None,
        )
        .await
    }

    pub async fn commit_diff(&self, hash: &str, commit_id: &str) -> ClientResult<CommitDiff> {
        self.call(
            Method::GET,
            &format!(
                "/playgrounds/{}/commits/{}/diff",
                encode_segment(hash),
                encode_segment(commit_id)
            ),
            None,
        )
        .await
    }

    /// Latest commit of a playground, or `None` when it has none.
    pub async fn latest_commit(&self, hash: &str) -> ClientResult<Option<Commit>> {
        let commits = self.list_commits(hash).await?;
        match commits.first() {
            Some(summary) => self.get_commit(hash, &summary.id).await.map(Some),
            None => Ok(None),
        }
    }
}

fn encode_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn list_query(params: &ListParams) -> String {
    let mut pairs = Vec::new();
    if let Some(offset) = params.offset {
        pairs.push(format!("offset={offset}"));
    }
    if let Some(limit) = params.limit {
        pairs.push(format!("limit={limit}"));
    }
    if let Some(sort) = params.sort {
        let sort = match sort {
            crate::types::PlaygroundSort::CreatedAt => "created_at",
            crate::types::PlaygroundSort::UpdatedAt => "updated_at",
            crate::types::PlaygroundSort::Stars => "stars",
        };
        pairs.push(format!("sort={sort}"));
    }
    if let Some(q) = &params.q {
        pairs.push(format!("q={}", urlencoding::encode(q)));
    }

    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaygroundSort;

    fn client(online: bool) -> ApiClient {
        // Nothing listens on port 9; only offline and cancellation paths are exercised.
        let config = ClientConfig::new("http://127.0.0.1:9/");
        ApiClient::new(&config, Connectivity::new(online)).unwrap()
    }

    #[test]
    fn test_list_query_encodes_search_term() {
        let query = list_query(&ListParams {
            offset: Some(20),
            limit: Some(10),
            sort: Some(PlaygroundSort::Stars),
            q: Some("a b&c".to_string()),
        });
        assert_eq!(query, "?offset=20&limit=10&sort=stars&q=a%20b%26c");
        assert_eq!(list_query(&ListParams::default()), "");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client(true).base_url(), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_writes_refused_while_offline() {
        let api = client(false);
        let result = api.toggle_star("h1").await;
        assert!(matches!(result, Err(ClientError::Offline(_))));
    }

    #[tokio::test]
    async fn test_cancelled_client_fails_fast() {
        let token = CancellationToken::new();
        let api = client(true).with_cancellation(token.clone());
        token.cancel();
        let result = api.get_playground("h1").await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_invalid_commit_rejected_before_sending() {
        let api = client(true);
        let req = NewCommit {
            message: String::new(),
            files: Vec::new(),
            active_file: None,
        };
        let result = api.create_commit("h1", &req).await;
        assert!(matches!(result, Err(ClientError::Invalid(_))));
    }
}
