use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::commits::get_commit;
use crate::error::Result;
use crate::store::Store;
use crate::types::{FileEntry, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    pub path: String,
    pub old_content: String,
    pub new_content: String,
}

/// Path-keyed partition of the changes between two file sets. Each list is
/// sorted by path and no path appears in more than one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub added: Vec<FileEntry>,
    pub modified: Vec<ModifiedFile>,
    pub deleted: Vec<FileEntry>,
}

impl FileDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn added_paths(&self) -> Vec<&str> {
        self.added.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn modified_paths(&self) -> Vec<&str> {
        self.modified.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn deleted_paths(&self) -> Vec<&str> {
        self.deleted.iter().map(|f| f.path.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDiff {
    pub commit_id: String,
    pub parent_id: Option<String>,
    #[serde(rename = "isRootCommit")]
    pub is_root_commit: bool,
    #[serde(flatten)]
    pub changes: FileDiff,
}

/// Computes what changed going from `source` to `target`.
pub fn diff_files(source: &[FileEntry], target: &[FileEntry]) -> FileDiff {
    let before: BTreeMap<&str, &str> = source
        .iter()
        .map(|f| (f.path.as_str(), f.content.as_str()))
        .collect();
    let after: BTreeMap<&str, &str> = target
        .iter()
        .map(|f| (f.path.as_str(), f.content.as_str()))
        .collect();

    let mut diff = FileDiff::default();

    for (path, new_content) in &after {
        match before.get(path) {
            None => diff.added.push(FileEntry::new(*path, *new_content)),
            Some(old_content) if old_content != new_content => {
                diff.modified.push(ModifiedFile {
                    path: path.to_string(),
                    old_content: old_content.to_string(),
                    new_content: new_content.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    for (path, old_content) in &before {
        if !after.contains_key(path) {
            diff.deleted.push(FileEntry::new(*path, *old_content));
        }
    }

    diff
}

/// Diffs a commit against its parent. A root commit diffs against the empty set.
pub fn diff_commit(
    store: &dyn Store,
    hash: &str,
    commit_id: &str,
    viewer: Option<&User>,
) -> Result<CommitDiff> {
    let commit = get_commit(store, hash, commit_id, viewer)?;

    let parent = match &commit.parent_id {
        Some(parent_id) => {
            let parent = store.get_commit(parent_id)?;
            if parent.is_none() {
                tracing::warn!(
                    commit = %commit.id,
                    parent = %parent_id,
                    "parent commit missing, diffing against empty set"
                );
            }
            parent
        }
        None => None,
    };

    let source = parent.as_ref().map(|p| p.files.as_slice()).unwrap_or(&[]);

    Ok(CommitDiff {
        changes: diff_files(source, &commit.files),
        is_root_commit: commit.parent_id.is_none(),
        parent_id: commit.parent_id,
        commit_id: commit.id,
    })
}
