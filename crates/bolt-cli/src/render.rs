use serde::Serialize;

use bolt_core::state::NoticeLevel;
use bolt_core::sync::SyncDiff;
use bolt_core::tree::visible_rows;
use bolt_core::tree::FolderNode;
use bolt_core::tree::RowKind;
use bolt_core::Origin;
use bolt_core::SessionState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: &'static str,
    pub generation: u64,
    pub project_title: String,
    pub files: usize,
    pub edited: usize,
    pub pending_overrides: usize,
    pub last_prompt: Option<String>,
    pub preview_dir: String,
    pub preview: &'static str,
}

impl StatusReport {
    pub fn print(&self) {
        println!("state:      {}", self.state);
        println!("generation: {}", self.generation);
        if !self.project_title.is_empty() {
            println!("project:    {}", self.project_title);
        }
        println!("files:      {} ({} edited)", self.files, self.edited);
        println!("overrides:  {}", self.pending_overrides);
        if let Some(prompt) = &self.last_prompt {
            println!("prompt:     {prompt}");
        }
        println!("preview:    {} ({})", self.preview, self.preview_dir);
    }
}

pub fn origin_marker(origin: Origin) -> char {
    match origin {
        Origin::Generated => ' ',
        Origin::UserEdited => 'M',
    }
}

pub fn print_file_list(state: &SessionState) {
    for file in state.store.list() {
        println!("{} {}", origin_marker(file.origin), file.path);
    }
}

pub fn print_tree(root: &FolderNode) {
    for row in visible_rows(root) {
        let indent = "  ".repeat(row.depth);
        match row.kind {
            RowKind::Folder => {
                let marker = if row.expanded { '-' } else { '+' };
                println!("{indent}{marker} {}/", row.name);
            }
            RowKind::File(origin) => {
                println!("{indent}{} {}", origin_marker(origin), row.name);
            }
        }
    }
}

pub fn describe_diff(diff: &SyncDiff) -> String {
    if diff.is_empty() {
        return "preview already up to date".to_string();
    }
    format!(
        "preview synced: {} written, {} removed",
        diff.create.len(),
        diff.destroy.len()
    )
}

/// Warnings go to stderr; errors are reported by the caller.
pub fn print_warnings(state: &SessionState) {
    for notice in state.notices.iter() {
        if notice.level == NoticeLevel::Warn {
            eprintln!("warning: {}", notice.message);
        }
    }
}
