use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::path::normalize_path;
use crate::path::PathError;
use crate::response::ParsedProject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Generated,
    UserEdited,
}

impl Origin {
    pub fn label(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::UserEdited => "user-edited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
    pub origin: Origin,
}

/// The canonical file map of one project.
///
/// Keys are always normalized paths. Lookups accept any spelling that
/// normalizes to a stored key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workspace {
    files: HashMap<String, ProjectFile>,
    pub project_title: String,
    pub explanation: String,
    pub summary: String,
    pub generated_files: Vec<String>,
    pub generation: u64,
}

impl Workspace {
    /// Builds a candidate workspace from a parsed response.
    ///
    /// Files whose path fails normalization are skipped and returned so the
    /// caller can report them. The rest load normally.
    pub fn from_parsed(parsed: &ParsedProject) -> (Self, Vec<PathError>) {
        let mut workspace = Self {
            project_title: parsed.project_title.clone(),
            explanation: parsed.explanation.clone(),
            summary: parsed.summary.clone(),
            ..Self::default()
        };
        let mut rejected = Vec::new();

        for (raw, content) in &parsed.files {
            match normalize_path(raw) {
                Ok(path) => {
                    if workspace.files.contains_key(&path) {
                        tracing::warn!(
                            path = %path,
                            raw = %raw,
                            "duplicate path in response; later entry wins"
                        );
                    }
                    workspace.insert(path, content.clone(), Origin::Generated);
                }
                Err(err) => rejected.push(err),
            }
        }

        workspace.generated_files = parsed
            .generated_files
            .iter()
            .filter_map(|raw| normalize_path(raw).ok())
            .collect();

        (workspace, rejected)
    }

    pub fn get(&self, path: &str) -> Option<&ProjectFile> {
        if let Some(file) = self.files.get(path) {
            return Some(file);
        }
        let normalized = normalize_path(path).ok()?;
        self.files.get(&normalized)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub(crate) fn file_mut(&mut self, path: &str) -> Option<&mut ProjectFile> {
        self.files.get_mut(path)
    }

    /// Inserts under an already normalized path.
    pub(crate) fn insert(&mut self, path: String, content: String, origin: Origin) {
        self.files.insert(
            path.clone(),
            ProjectFile {
                path,
                content,
                origin,
            },
        );
    }

    pub(crate) fn remove(&mut self, path: &str) -> Option<ProjectFile> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in lexicographic path order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = &ProjectFile> {
        let mut files: Vec<&ProjectFile> = self.files.values().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.into_iter()
    }

    pub fn paths(&self) -> Vec<String> {
        self.iter_sorted().map(|file| file.path.clone()).collect()
    }

    pub fn content_map(&self) -> BTreeMap<String, String> {
        self.files
            .values()
            .map(|file| (file.path.clone(), file.content.clone()))
            .collect()
    }

    pub fn edited_count(&self) -> usize {
        self.files
            .values()
            .filter(|file| file.origin == Origin::UserEdited)
            .count()
    }
}

/// Paths the user changed since the last generation, with their content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditOverrides {
    entries: BTreeMap<String, String>,
}

impl EditOverrides {
    pub fn capture(&mut self, path: &str, content: &str) {
        self.entries.insert(path.to_string(), content.to_string());
    }

    pub fn release(&mut self, path: &str) -> Option<String> {
        self.entries.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for EditOverrides {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::path::PathRejection;

    fn parsed(files: &[(&str, &str)]) -> ParsedProject {
        ParsedProject {
            project_title: "Todo".to_string(),
            explanation: "narrative".to_string(),
            summary: "summary".to_string(),
            files: files
                .iter()
                .map(|(path, content)| (path.to_string(), content.to_string()))
                .collect::<BTreeMap<_, _>>(),
            generated_files: files.iter().map(|(path, _)| path.to_string()).collect(),
        }
    }

    #[test]
    fn traversal_paths_are_skipped_and_reported() {
        let (workspace, rejected) = Workspace::from_parsed(&parsed(&[
            ("../../etc/passwd", "root"),
            ("App.js", "A"),
            ("src/index.js", "I"),
        ]));

        assert_eq!(workspace.paths(), vec!["App.js", "src/index.js"]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].path, "../../etc/passwd");
        assert_eq!(rejected[0].reason, PathRejection::ParentSegment);
        assert_eq!(workspace.generated_files, vec!["App.js", "src/index.js"]);
    }

    #[test]
    fn lookups_accept_any_spelling() {
        let (workspace, _) = Workspace::from_parsed(&parsed(&[("src/App.js", "A")]));
        assert_eq!(workspace.get("/src/App.js").map(|f| f.content.as_str()), Some("A"));
        assert_eq!(workspace.get("src//App.js").map(|f| f.content.as_str()), Some("A"));
        assert!(workspace.get("../src/App.js").is_none());
        assert!(workspace.get("").is_none());
    }

    #[test]
    fn spellings_that_collide_keep_one_entry() {
        let (workspace, rejected) =
            Workspace::from_parsed(&parsed(&[("src//App.js", "first"), ("src/App.js", "second")]));
        assert!(rejected.is_empty());
        assert_eq!(workspace.len(), 1);
        assert_eq!(
            workspace.get("src/App.js").map(|f| f.content.as_str()),
            Some("second")
        );
    }

    #[test]
    fn enumeration_is_sorted() {
        let (workspace, _) = Workspace::from_parsed(&parsed(&[
            ("src/b.js", ""),
            ("README.md", ""),
            ("src/a.js", ""),
        ]));
        assert_eq!(workspace.paths(), vec!["README.md", "src/a.js", "src/b.js"]);
        assert_eq!(workspace.edited_count(), 0);
    }
}
