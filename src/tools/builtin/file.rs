//! Sandboxed browsing of the download root.
//!
//! Gives the calling agent a way to look at what flows have produced
//! without handing out filesystem access: paths are normalized lexically
//! and rejected if they escape the root.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use glob::Pattern;
use serde_json::{Value, json};
use tokio::fs;

use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// Maximum directory listing entries.
const MAX_DIR_ENTRIES: usize = 500;

/// Normalize a path by resolving `.` and `..` components lexically (no
/// filesystem access), so escapes through non-existent parents are caught
/// before anything touches disk.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if components
                    .last()
                    .is_some_and(|c| matches!(c, std::path::Component::Normal(_)))
                {
                    components.pop();
                }
            }
            std::path::Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Resolve `rel` under `base`, rejecting anything that escapes the base.
fn resolve_sandboxed(base: &Path, rel: &str) -> Result<PathBuf, ToolError> {
    if Path::new(rel).is_absolute() {
        return Err(ToolError::NotAuthorized(rel.to_string()));
    }
    let base_normal = normalize_lexical(base);
    let joined = normalize_lexical(&base.join(rel));
    if !joined.starts_with(&base_normal) {
        return Err(ToolError::NotAuthorized(rel.to_string()));
    }
    Ok(joined)
}

#[derive(Debug)]
struct DirEntryInfo {
    name: String,
    is_dir: bool,
    size: u64,
}

async fn list_entries(
    dir: &Path,
    pattern: Option<&Pattern>,
    files_only: bool,
    max_items: usize,
) -> Result<Vec<DirEntryInfo>, ToolError> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to read directory: {err}")))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to read entry: {err}")))?
    {
        if entries.len() >= max_items {
            break;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let metadata = entry.metadata().await.ok();
        let is_dir = metadata.as_ref().is_some_and(|m| m.is_dir());

        if files_only && is_dir {
            continue;
        }
        if let Some(pattern) = pattern {
            if !pattern.matches(&name) {
                continue;
            }
        }

        entries.push(DirEntryInfo {
            name,
            is_dir,
            size: metadata.map(|m| m.len()).unwrap_or(0),
        });
    }

    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
    Ok(entries)
}

fn entry_json(entry: &DirEntryInfo) -> Value {
    json!({
        "name": entry.name,
        "kind": if entry.is_dir { "dir" } else { "file" },
        "size": entry.size,
    })
}

// ── list_downloads ──────────────────────────────────────────────────

/// List files under the download root.
pub struct ListDownloadsTool {
    root: PathBuf,
}

impl ListDownloadsTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ListDownloadsTool {
    fn name(&self) -> &str {
        "list_downloads"
    }

    fn description(&self) -> &str {
        "List files and directories under the engine's download root. \
         Use `path` for a subdirectory and `glob` to filter names (e.g. '*.csv')."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Relative path under the download root (defaults to the root)"
                },
                "glob": {
                    "type": "string",
                    "description": "Name filter, e.g. '*.csv'"
                },
                "files_only": {
                    "type": "boolean",
                    "description": "Skip directories (default false)"
                },
                "max_items": {
                    "type": "integer",
                    "description": "Cap on returned entries (default 500)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let rel = params.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let files_only = params
            .get("files_only")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let max_items = params
            .get("max_items")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(MAX_DIR_ENTRIES)
            .min(MAX_DIR_ENTRIES);
        let pattern = params
            .get("glob")
            .and_then(|v| v.as_str())
            .map(Pattern::new)
            .transpose()
            .map_err(|err| ToolError::InvalidParameters(format!("bad glob: {err}")))?;

        let dir = resolve_sandboxed(&self.root, rel)?;
        let entries = list_entries(&dir, pattern.as_ref(), files_only, max_items).await?;

        Ok(ToolOutput::success(
            json!({
                "path": dir.display().to_string(),
                "entries": entries.iter().map(entry_json).collect::<Vec<_>>(),
                "count": entries.len(),
            }),
            start.elapsed(),
        ))
    }
}

// ── find_download ───────────────────────────────────────────────────

/// Dice coefficient over character bigrams.
fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let bigrams = |s: &str| -> Vec<(char, char)> { s.chars().zip(s.chars().skip(1)).collect() };
    let a_grams = bigrams(a);
    let mut b_grams = bigrams(b);
    if a_grams.is_empty() || b_grams.is_empty() {
        return 0.0;
    }
    let total = a_grams.len() + b_grams.len();
    let mut matches = 0usize;
    for gram in &a_grams {
        if let Some(pos) = b_grams.iter().position(|g| g == gram) {
            b_grams.swap_remove(pos);
            matches += 1;
        }
    }
    (2.0 * matches as f64) / total as f64
}

/// Score a file stem against the query: base similarity plus bonuses for
/// exact, prefix, and substring matches, capped at 1.0.
fn fuzzy_score(query: &str, stem: &str) -> f64 {
    let query = query.trim().to_lowercase();
    let stem = stem.to_lowercase();
    if query.is_empty() {
        return 0.0;
    }
    let mut score = similarity(&query, &stem);
    if stem == query {
        score += 0.30;
    } else if stem.starts_with(&query) {
        score += 0.15;
    } else if stem.contains(&query) {
        score += 0.10;
    }
    score.min(1.0)
}

/// Fuzzy-find a file by name under the download root.
pub struct FindDownloadTool {
    root: PathBuf,
}

impl FindDownloadTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for FindDownloadTool {
    fn name(&self) -> &str {
        "find_download"
    }

    fn description(&self) -> &str {
        "Fuzzy-find a file by name under the download root. Returns the best \
         match when it is unambiguous, otherwise the scored top candidates."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Approximate file name (without extension)"},
                "path": {"type": "string", "description": "Relative directory to search (defaults to the root)"},
                "glob": {"type": "string", "description": "Name filter applied before matching, e.g. '*.csv'"},
                "topk": {"type": "integer", "description": "Number of candidates to return (default 5)"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let name = require_str(&params, "name")?;
        let rel = params.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let topk = params
            .get("topk")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(5)
            .max(1);
        let pattern = params
            .get("glob")
            .and_then(|v| v.as_str())
            .map(Pattern::new)
            .transpose()
            .map_err(|err| ToolError::InvalidParameters(format!("bad glob: {err}")))?;

        let dir = resolve_sandboxed(&self.root, rel)?;
        let entries = list_entries(&dir, pattern.as_ref(), true, MAX_DIR_ENTRIES).await?;

        let mut scored: Vec<(f64, &DirEntryInfo)> = entries
            .iter()
            .map(|entry| {
                let stem = Path::new(&entry.name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| entry.name.clone());
                (fuzzy_score(name, &stem), entry)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(topk);

        let candidates: Vec<Value> = scored
            .iter()
            .map(|(score, entry)| {
                let mut value = entry_json(entry);
                value["score"] = json!((score * 1000.0).round() / 1000.0);
                value
            })
            .collect();

        let status = match scored.as_slice() {
            [] => "none",
            [(best, _)] if *best >= 0.75 => "found",
            [(best, _), (runner_up, _), ..] if *best >= 0.75 && best - runner_up >= 0.1 => "found",
            _ => "ambiguous",
        };

        let mut result = json!({
            "status": status,
            "candidates": candidates,
        });
        if status == "found" {
            result["best"] = candidates[0].clone();
        }

        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_lexical_resolves_dots() {
        assert_eq!(
            normalize_lexical(Path::new("/a/b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(
            normalize_lexical(Path::new("/a/./b/./c")),
            PathBuf::from("/a/b/c")
        );
        assert_eq!(normalize_lexical(Path::new("/a/../../..")), PathBuf::from("/"));
    }

    #[test]
    fn sandbox_rejects_escapes() {
        let base = Path::new("/data/downloads");
        assert!(resolve_sandboxed(base, "jobs/abc").is_ok());
        assert!(resolve_sandboxed(base, "../secrets").is_err());
        assert!(resolve_sandboxed(base, "a/../../../etc/passwd").is_err());
        assert!(resolve_sandboxed(base, "/etc/passwd").is_err());
        assert!(resolve_sandboxed(base, "a/../b").is_ok());
    }

    #[test]
    fn fuzzy_scores_prefer_closer_stems() {
        assert_eq!(fuzzy_score("report", "report"), 1.0);
        assert!(fuzzy_score("report", "report_2024") > fuzzy_score("report", "summary"));
        assert!(fuzzy_score("grades", "grades_fall") >= 0.75);
        assert_eq!(fuzzy_score("", "anything"), 0.0);
    }

    #[tokio::test]
    async fn list_downloads_reports_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.csv"), b"1").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"22").unwrap();
        std::fs::create_dir(dir.path().join("job-1")).unwrap();

        let tool = ListDownloadsTool::new(dir.path().to_path_buf());
        let output = tool.execute(json!({})).await.unwrap();
        let entries = output.result["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 3);
        // directories first
        assert_eq!(entries[0]["kind"], "dir");

        let output = tool
            .execute(json!({"glob": "*.csv", "files_only": true}))
            .await
            .unwrap();
        let entries = output.result["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "a.csv");
    }

    #[tokio::test]
    async fn list_downloads_refuses_escape() {
        let dir = TempDir::new().unwrap();
        let tool = ListDownloadsTool::new(dir.path().to_path_buf());
        let err = tool.execute(json!({"path": "../.."})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn find_download_picks_unambiguous_best() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("timetable_fall.csv"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"y").unwrap();

        let tool = FindDownloadTool::new(dir.path().to_path_buf());
        let output = tool.execute(json!({"name": "timetable_fall"})).await.unwrap();
        assert_eq!(output.result["status"], "found");
        assert_eq!(output.result["best"]["name"], "timetable_fall.csv");
    }

    #[tokio::test]
    async fn find_download_reports_ambiguity() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report_a.csv"), b"x").unwrap();
        std::fs::write(dir.path().join("report_b.csv"), b"y").unwrap();

        let tool = FindDownloadTool::new(dir.path().to_path_buf());
        let output = tool.execute(json!({"name": "report"})).await.unwrap();
        assert_eq!(output.result["status"], "ambiguous");
        assert_eq!(output.result["candidates"].as_array().unwrap().len(), 2);
    }
}
