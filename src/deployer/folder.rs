//! Destination folder naming.
//!
//! The folder is named after the Solution. When that title is taken the first free
//! name of `"<title> 1"`, `"<title> 2"`, ... is used. Another client may claim the
//! chosen name between listing and creating, so a [`FolderCreation::TitleTaken`]
//! answer marks the name as used and the next candidate is tried.

use anyhow::{Result, bail};
use std::collections::HashSet;
use tracing::debug;

use crate::portal::{Folder, FolderCreation, Portal};

/// Upper bound on creation attempts before giving up.
const MAX_FOLDER_ATTEMPTS: usize = 100;

/// `title` with the smallest non-negative suffix not in `taken`.
///
/// Suffix 0 is the bare title.
pub fn unique_folder_name(title: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(title) {
        return title.to_string();
    }
    (1..)
        .map(|n| format!("{title} {n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| title.to_string())
}

/// Create a folder named after `title`, avoiding the titles in `existing`.
pub async fn create_unique_folder(
    portal: &dyn Portal,
    title: &str,
    existing: &[Folder],
) -> Result<Folder> {
    let mut taken: HashSet<String> = existing.iter().map(|folder| folder.title.clone()).collect();

    for _ in 0..MAX_FOLDER_ATTEMPTS {
        let name = unique_folder_name(title, &taken);
        match portal.create_folder(&name).await? {
            FolderCreation::Created(folder) => return Ok(folder),
            FolderCreation::TitleTaken => {
                debug!("Folder title '{}' was taken, trying the next suffix", name);
                taken.insert(name);
            }
        }
    }

    bail!("No free folder title for '{title}' after {MAX_FOLDER_ATTEMPTS} attempts")
}
