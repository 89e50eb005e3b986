//! Reconciliation of a fresh generation with the user's pending edits.

use crate::workspace::EditOverrides;
use crate::workspace::Origin;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub workspace: Workspace,
    /// Overrides that still refer to a file in the merged workspace.
    pub overrides: EditOverrides,
    /// Paths whose incoming content was replaced by the user's version.
    pub reapplied: Vec<String>,
    /// Override paths the new generation no longer contains.
    pub pruned: Vec<String>,
}

/// Applies `overrides` on top of `incoming`.
///
/// An override whose content differs from the incoming file replaces it and
/// marks it user-edited. An override equal to the incoming content is kept
/// but the file stays generated. Overrides for paths missing from `incoming`
/// are pruned, so the file disappears with the regeneration.
pub fn merge(mut incoming: Workspace, overrides: &EditOverrides) -> MergeOutcome {
    let mut kept = EditOverrides::default();
    let mut reapplied = Vec::new();
    let mut pruned = Vec::new();

    for (path, content) in overrides.iter() {
        let Some(file) = incoming.file_mut(path) else {
            pruned.push(path.to_string());
            continue;
        };
        if file.content != content {
            file.content = content.to_string();
            file.origin = Origin::UserEdited;
            reapplied.push(path.to_string());
        }
        kept.capture(path, content);
    }

    if !reapplied.is_empty() || !pruned.is_empty() {
        tracing::debug!(
            reapplied = reapplied.len(),
            pruned = pruned.len(),
            "merged edit overrides"
        );
    }

    MergeOutcome {
        workspace: incoming,
        overrides: kept,
        reapplied,
        pruned,
    }
}
