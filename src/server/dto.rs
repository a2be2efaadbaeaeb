use serde::Deserialize;

pub use crate::vcs::{ForkRequest, ListParams, NewCommit, NewPlayground, UpdatePlayground};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}
