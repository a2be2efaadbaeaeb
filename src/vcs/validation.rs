use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::FileEntry;

const MAX_NAME_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 2_000;
const MAX_MESSAGE_LEN: usize = 500;
const MAX_PATH_LEN: usize = 255;
const MAX_FILES: usize = 200;
const MAX_FILE_BYTES: usize = 1_048_576;

fn bad_request(message: impl Into<String>) -> Error {
    Error::BadRequest(message.into())
}

/// Trims an optional text field; empty strings clear it.
pub fn normalize_text(value: Option<String>, field: &str, max_len: usize) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_len {
        return Err(bad_request(format!("{field} cannot exceed {max_len} characters")));
    }
    Ok(Some(trimmed.to_string()))
}

pub fn normalize_name(name: Option<String>) -> Result<Option<String>> {
    normalize_text(name, "Name", MAX_NAME_LEN)
}

pub fn normalize_description(description: Option<String>) -> Result<Option<String>> {
    normalize_text(description, "Description", MAX_DESCRIPTION_LEN)
}

pub fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(bad_request("Commit message cannot be empty"));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(bad_request(format!(
            "Commit message cannot exceed {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(bad_request("File path cannot be empty"));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(bad_request(format!(
            "File path cannot exceed {MAX_PATH_LEN} characters"
        )));
    }

    const INVALID_CHARS: &[char] = &['\0', '\n', '\r'];
    if path.chars().any(|c| INVALID_CHARS.contains(&c)) {
        return Err(bad_request("File path contains invalid characters"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(bad_request("File path cannot contain '..' segments"));
    }
    Ok(())
}

/// Checks a commit's file set: bounded size, valid and unique paths, and an
/// active file that names one of the files.
pub fn validate_files(files: &[FileEntry], active_file: Option<&str>) -> Result<()> {
    if files.len() > MAX_FILES {
        return Err(bad_request(format!(
            "A commit cannot contain more than {MAX_FILES} files"
        )));
    }

    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        validate_path(&file.path)?;
        if file.content.len() > MAX_FILE_BYTES {
            return Err(bad_request(format!("File '{}' is too large", file.path)));
        }
        if !seen.insert(file.path.as_str()) {
            return Err(bad_request(format!("Duplicate file path '{}'", file.path)));
        }
    }

    if let Some(active) = active_file {
        if !seen.contains(active) {
            return Err(bad_request(format!(
                "Active file '{active}' is not part of the commit"
            )));
        }
    }

    Ok(())
}
