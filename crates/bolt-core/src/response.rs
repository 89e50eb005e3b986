//! Extraction of a structured project from a raw generation response.
//!
//! A response is free-form narrative text plus one fenced block tagged
//! `json`. The block is located with a single forward scan: the first fence
//! whose tag is `json` (any ASCII case) wins, even if a later block would
//! parse. Fences with any other tag are skipped whole, unless what would
//! close them is itself a `json` opener: then the earlier fence is treated
//! as stray text and the scan resumes at the opener. Inside the json block
//! the scanner tracks JSON string state, so a triple backtick that appears in
//! a file's code does not close the block early.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::WorkspaceError;
use crate::workspace::Workspace;

pub const STRUCTURED_TAG: &str = "json";
const FENCE: &str = "```";
const ZERO_WIDTH: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Result of a successful [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedProject {
    pub project_title: String,
    /// The raw response with the structured block removed, trimmed.
    pub explanation: String,
    /// The `explanation` field carried inside the structured block.
    ///
    /// File and generated paths keep the spelling the service used. They
    /// are normalized when the project is loaded into a workspace.
    #[serde(default)]
    pub summary: String,
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub generated_files: Vec<String>,
}

/// A file's `code` value as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FileCode {
    Text(String),
    Structured(Value),
}

impl FileCode {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Structured(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    code: FileCode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDocument {
    project_title: String,
    explanation: String,
    files: BTreeMap<String, FileEntry>,
    #[serde(default)]
    generated_files: Vec<String>,
}

/// Byte span of a located block inside the raw response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Offset of the opening fence.
    pub start: usize,
    /// Offset just past the closing fence.
    pub end: usize,
    pub body: &'a str,
}

pub fn parse(raw: &str) -> Result<ParsedProject, WorkspaceError> {
    let block = find_structured_block(raw).ok_or_else(|| {
        WorkspaceError::MalformedResponse("no fenced json block found".to_string())
    })?;

    let body: String = block.body.chars().filter(|ch| !ZERO_WIDTH.contains(ch)).collect();
    let document: ProjectDocument = serde_json::from_str(body.trim()).map_err(|err| {
        WorkspaceError::MalformedResponse(format!("invalid project document: {err}"))
    })?;

    let mut narrative = String::with_capacity(raw.len());
    narrative.push_str(&raw[..block.start]);
    narrative.push_str(&raw[block.end..]);

    let files = document
        .files
        .into_iter()
        .map(|(path, entry)| (path, entry.code.into_text()))
        .collect();

    Ok(ParsedProject {
        project_title: document.project_title,
        explanation: narrative.trim().to_string(),
        summary: document.explanation,
        files,
        generated_files: document.generated_files,
    })
}

pub fn find_structured_block(raw: &str) -> Option<FencedBlock<'_>> {
    let mut cursor = 0;
    while let Some(found) = raw[cursor..].find(FENCE) {
        let open = cursor + found;
        let after_fence = open + FENCE.len();
        let tag = fence_tag(raw, after_fence);
        let body_start = after_fence + tag.len();

        if tag.eq_ignore_ascii_case(STRUCTURED_TAG) {
            let close = find_closing_fence(raw, body_start)?;
            return Some(FencedBlock {
                start: open,
                end: close + FENCE.len(),
                body: &raw[body_start..close],
            });
        }

        let close = body_start + raw[body_start..].find(FENCE)?;
        if fence_tag(raw, close + FENCE.len()).eq_ignore_ascii_case(STRUCTURED_TAG) {
            cursor = close;
            continue;
        }
        cursor = close + FENCE.len();
    }
    None
}

fn fence_tag(raw: &str, after_fence: usize) -> &str {
    let len = raw[after_fence..]
        .bytes()
        .take_while(|byte| byte.is_ascii_alphanumeric())
        .count();
    &raw[after_fence..after_fence + len]
}

fn find_closing_fence(raw: &str, from: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut in_string = false;
    let mut escaped = false;
    let mut idx = from;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
        } else if byte == b'"' {
            in_string = true;
        } else if bytes[idx..].starts_with(FENCE.as_bytes()) {
            return Some(idx);
        }
        idx += 1;
    }
    None
}

/// Renders a workspace back into the generation document format.
///
/// Sent as `previousContent` on regeneration so the service sees the
/// current files, including local edits.
pub fn render_project_document(workspace: &Workspace) -> String {
    let mut files = serde_json::Map::new();
    let mut generated = Vec::with_capacity(workspace.len());
    for file in workspace.iter_sorted() {
        let path = format!("/{}", file.path);
        files.insert(
            path.clone(),
            serde_json::json!({ "code": file.content.as_str() }),
        );
        generated.push(Value::String(path));
    }

    let document = serde_json::json!({
        "projectTitle": workspace.project_title.as_str(),
        "explanation": workspace.summary.as_str(),
        "files": files,
        "generatedFiles": generated,
    });
    let body = serde_json::to_string_pretty(&document).unwrap_or_else(|_| document.to_string());
    format!("{FENCE}{STRUCTURED_TAG}\n{body}\n{FENCE}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn block(json: &str) -> String {
        format!("```json\n{json}\n```")
    }

    #[test]
    fn extracts_project_and_strips_block_from_narrative() {
        let raw = "Here you go.\n```json\n{\"projectTitle\":\"T\",\"explanation\":\"E\",\"files\":{\"/App.js\":{\"code\":\"x\"}},\"generatedFiles\":[\"/App.js\"]}\n```";
        let parsed = parse(raw).expect("parse");

        assert_eq!(parsed.project_title, "T");
        assert_eq!(parsed.explanation, "Here you go.");
        assert_eq!(parsed.summary, "E");
        assert_eq!(
            parsed.files,
            BTreeMap::from([("/App.js".to_string(), "x".to_string())])
        );
        assert_eq!(parsed.generated_files, vec!["/App.js".to_string()]);
    }

    #[test]
    fn narrative_around_block_is_joined_and_trimmed() {
        let raw = format!(
            "  Intro line.\n\n{}\n\nRun npm start.  \n",
            block(r#"{"projectTitle":"","explanation":"","files":{}}"#)
        );
        let parsed = parse(&raw).expect("parse");
        assert_eq!(parsed.explanation, "Intro line.\n\n\n\nRun npm start.");
        assert!(!parsed.explanation.contains("```"));
        assert!(parsed.files.is_empty());
        assert!(parsed.generated_files.is_empty());
    }

    #[test]
    fn structured_code_is_pretty_printed() {
        let raw = block(
            r#"{"projectTitle":"T","explanation":"","files":{"/package.json":{"code":{"name":"app","private":true}}}}"#,
        );
        let parsed = parse(&raw).expect("parse");
        assert_eq!(
            parsed.files.get("/package.json").map(String::as_str),
            Some("{\n  \"name\": \"app\",\n  \"private\": true\n}")
        );
    }

    #[test]
    fn fence_inside_file_code_does_not_close_the_block() {
        let raw = block(
            r#"{"projectTitle":"T","explanation":"","files":{"README.md":{"code":"```bash\nnpm start\n```"}}}"#,
        );
        let parsed = parse(&raw).expect("parse");
        assert_eq!(
            parsed.files.get("README.md").map(String::as_str),
            Some("```bash\nnpm start\n```")
        );
    }

    #[test]
    fn first_json_block_wins() {
        let raw = format!(
            "{}\nand another\n{}",
            block(r#"{"projectTitle":"first","explanation":"","files":{}}"#),
            block(r#"{"projectTitle":"second","explanation":"","files":{}}"#)
        );
        let parsed = parse(&raw).expect("parse");
        assert_eq!(parsed.project_title, "first");
        assert!(parsed.explanation.contains("second"));
    }

    #[test]
    fn first_json_block_wins_even_when_malformed() {
        let raw = format!(
            "{}\n{}",
            block("{ not json"),
            block(r#"{"projectTitle":"ok","explanation":"","files":{}}"#)
        );
        assert!(matches!(
            parse(&raw),
            Err(WorkspaceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn blocks_with_other_tags_are_skipped() {
        let raw = format!(
            "```bash\nnpm install\n```\n{}",
            block(r#"{"projectTitle":"T","explanation":"","files":{}}"#)
        );
        let parsed = parse(&raw).expect("parse");
        assert_eq!(parsed.project_title, "T");
        assert_eq!(parsed.explanation, "```bash\nnpm install\n```");
    }

    #[test]
    fn stray_fence_in_narrative_does_not_hide_the_block() {
        let raw = format!(
            "Wrap code in ``` when you paste it.\n{}",
            block(r#"{"projectTitle":"T","explanation":"","files":{"App.js":{"code":"x"}}}"#)
        );
        let parsed = parse(&raw).expect("parse");
        assert_eq!(parsed.project_title, "T");
        assert_eq!(parsed.explanation, "Wrap code in ``` when you paste it.");

        let raw = format!(
            "```\nnpm start\n```\nThen:\n{}",
            block(r#"{"projectTitle":"after","explanation":"","files":{}}"#)
        );
        assert_eq!(parse(&raw).expect("parse").project_title, "after");
    }

    #[test]
    fn path_spellings_are_left_for_the_workspace_to_merge() {
        let raw = block(
            r#"{"projectTitle":"T","explanation":"","files":{"/App.js":{"code":"a"},"App.js":{"code":"b"}}}"#,
        );
        let parsed = parse(&raw).expect("parse");
        assert_eq!(parsed.files.len(), 2);

        let (workspace, rejected) = Workspace::from_parsed(&parsed);
        assert!(rejected.is_empty());
        assert_eq!(workspace.paths(), vec!["App.js"]);
        assert_eq!(workspace.get("App.js").map(|f| f.content.as_str()), Some("b"));
    }

    #[test]
    fn tag_match_ignores_case_and_inline_body() {
        let raw = r#"```JSON{"projectTitle":"T","explanation":"","files":{}}```"#;
        assert_eq!(parse(raw).expect("parse").project_title, "T");

        let raw = "```jsonc\n{}\n```";
        assert!(matches!(parse(raw), Err(WorkspaceError::MalformedResponse(_))));
    }

    #[test]
    fn zero_width_characters_are_ignored() {
        let raw = block("\u{FEFF}{\"projectTitle\":\"T\",\u{200B}\"explanation\":\"\",\"files\":{}}");
        assert_eq!(parse(&raw).expect("parse").project_title, "T");
    }

    #[test]
    fn missing_or_malformed_blocks_fail_cleanly() {
        let cases = [
            String::new(),
            "just some prose".to_string(),
            "```json\n{\"projectTitle\":\"T\"".to_string(),
            block("[1, 2, 3]"),
            block(r#"{"projectTitle":"T","explanation":"E"}"#),
            block(r#"{"projectTitle":"T","explanation":"E","files":[]}"#),
            block(r#"{"projectTitle":7,"explanation":"E","files":{}}"#),
            block(r#"{"projectTitle":"T","explanation":"E","files":{"a.js":{"source":"x"}}}"#),
        ];
        for raw in cases {
            assert!(
                matches!(parse(&raw), Err(WorkspaceError::MalformedResponse(_))),
                "expected malformed response for {raw:?}"
            );
        }
    }
}
