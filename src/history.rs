//! Git history ingestion.
//!
//! Walks the commit log newest-first via the `git` CLI and converts
//! commits and per-file diffs into durable rows: `version` for commit
//! metadata, `change_event` for one (commit, file) pair. Both operations
//! are idempotent through existence checks, and a single commit's diff
//! failure is logged and skipped rather than aborting the extraction.

use crate::store::{GraphStore, NewChangeEvent};
use crate::{Error, Result};
use std::path::Path;
use std::process::Command;

/// Diff text stored per change event is bounded.
const MAX_DIFF_CHARS: usize = 10_000;

/// Field and record separators for the log format string.
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// One commit from the log, newest-first order.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub id: String,
    /// First parent; None for the root commit.
    pub parent_id: Option<String>,
    pub author: String,
    pub timestamp: i64,
    pub message: String,
}

/// Classification of one file's change within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        }
    }

    /// Map a `--name-status` status letter.
    fn from_status(status: &str) -> Option<ChangeKind> {
        match status.chars().next()? {
            'A' => Some(ChangeKind::Added),
            'M' => Some(ChangeKind::Modified),
            'D' => Some(ChangeKind::Deleted),
            'R' => Some(ChangeKind::Renamed),
            'C' => Some(ChangeKind::Added),
            'T' => Some(ChangeKind::Modified),
            _ => None,
        }
    }
}

/// Extract commit metadata into the version table.
///
/// Walks newest-first and stops at `since_commit` (exclusive). Commits
/// already present are skipped by existence check, so repeated calls are
/// idempotent.
pub fn extract_commits(
    store: &GraphStore,
    repo_id: i64,
    repo_path: &Path,
    since_commit: Option<&str>,
) -> Result<usize> {
    let commits = read_commit_log(repo_path)?;
    let mut count = 0;
    for commit in &commits {
        if since_commit == Some(commit.id.as_str()) {
            break;
        }
        if store.version_exists(repo_id, &commit.id)? {
            continue;
        }
        store.insert_version(
            repo_id,
            &commit.id,
            commit.timestamp,
            &commit.author,
            &commit.message,
        )?;
        count += 1;
    }
    Ok(count)
}

/// Extract per-file change events for every commit.
///
/// The root commit's files are recorded as `added` with no diff text;
/// every other commit is diffed against its first parent.
pub fn extract_changes(store: &GraphStore, repo_id: i64, repo_path: &Path) -> Result<usize> {
    let commits = read_commit_log(repo_path)?;
    let mut count = 0;

    for commit in &commits {
        match &commit.parent_id {
            None => {
                let files = match root_commit_files(repo_path, &commit.id) {
                    Ok(f) => f,
                    Err(err) => {
                        tracing::warn!(commit = %commit.id, error = %err, "listing root commit failed");
                        continue;
                    }
                };
                for path in files {
                    if store.change_event_exists(repo_id, &commit.id, &path)? {
                        continue;
                    }
                    store.insert_change_event(
                        repo_id,
                        &NewChangeEvent {
                            commit_id: &commit.id,
                            parent_commit_id: None,
                            path: &path,
                            kind: ChangeKind::Added.as_str(),
                            diff_text: None,
                            summary: &commit.message,
                            timestamp: commit.timestamp,
                        },
                    )?;
                    count += 1;
                }
            }
            Some(parent) => {
                let changes = match diff_name_status(repo_path, parent, &commit.id) {
                    Ok(c) => c,
                    Err(err) => {
                        tracing::warn!(commit = %commit.id, error = %err, "diff failed, skipping commit");
                        continue;
                    }
                };
                for (kind, path) in changes {
                    if store.change_event_exists(repo_id, &commit.id, &path)? {
                        continue;
                    }
                    let diff_text = match diff_for_file(repo_path, parent, &commit.id, &path) {
                        Ok(text) => Some(truncate_chars(&text, MAX_DIFF_CHARS)),
                        Err(err) => {
                            tracing::warn!(commit = %commit.id, path = %path, error = %err, "per-file diff failed");
                            None
                        }
                    };
                    store.insert_change_event(
                        repo_id,
                        &NewChangeEvent {
                            commit_id: &commit.id,
                            parent_commit_id: Some(parent),
                            path: &path,
                            kind: kind.as_str(),
                            diff_text: diff_text.as_deref(),
                            summary: &commit.message,
                            timestamp: commit.timestamp,
                        },
                    )?;
                    count += 1;
                }
            }
        }
    }
    Ok(count)
}

/// Read the full commit log, newest first.
pub fn read_commit_log(repo_path: &Path) -> Result<Vec<CommitRecord>> {
    let format = format!(
        "--format=%H{sep}%P{sep}%an{sep}%at{sep}%s{rec}",
        sep = FIELD_SEP,
        rec = RECORD_SEP
    );
    let output = run_git(repo_path, &["log", &format])?;
    Ok(parse_commit_log(&output))
}

fn root_commit_files(repo_path: &Path, commit_id: &str) -> Result<Vec<String>> {
    let output = run_git(
        repo_path,
        &["show", "--pretty=format:", "--name-only", commit_id],
    )?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn diff_name_status(
    repo_path: &Path,
    parent: &str,
    commit_id: &str,
) -> Result<Vec<(ChangeKind, String)>> {
    let output = run_git(
        repo_path,
        &["diff", "--name-status", "-M", parent, commit_id],
    )?;
    Ok(parse_name_status(&output))
}

fn diff_for_file(repo_path: &Path, parent: &str, commit_id: &str, path: &str) -> Result<String> {
    run_git(repo_path, &["diff", parent, commit_id, "--", path])
}

fn run_git(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .map_err(|e| Error::Git(format!("failed to run git: {}", e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Git(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse the record-separated log format.
fn parse_commit_log(output: &str) -> Vec<CommitRecord> {
    let mut commits = Vec::new();
    for record in output.split(RECORD_SEP) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        let fields: Vec<&str> = record.split(FIELD_SEP).collect();
        if fields.len() < 5 {
            continue;
        }
        let parent_id = fields[1]
            .split_whitespace()
            .next()
            .map(str::to_string);
        let Ok(timestamp) = fields[3].trim().parse::<i64>() else {
            continue;
        };
        commits.push(CommitRecord {
            id: fields[0].to_string(),
            parent_id,
            author: fields[2].to_string(),
            timestamp,
            message: fields[4].to_string(),
        });
    }
    commits
}

/// Parse `git diff --name-status` output. Renames carry two paths; the
/// new path is recorded.
fn parse_name_status(output: &str) -> Vec<(ChangeKind, String)> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let mut parts = line.split('\t');
        let Some(status) = parts.next() else {
            continue;
        };
        let Some(kind) = ChangeKind::from_status(status.trim()) else {
            continue;
        };
        let path = if kind == ChangeKind::Renamed {
            parts.nth(1)
        } else {
            parts.next()
        };
        if let Some(path) = path {
            changes.push((kind, path.trim().to_string()));
        }
    }
    changes
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit_log() {
        let output = format!(
            "aaa111{s}bbb222 ccc333{s}Ada{s}1700000100{s}fix parser{r}\
             bbb222{s}{s}Ada{s}1700000000{s}initial{r}",
            s = FIELD_SEP,
            r = RECORD_SEP
        );
        let commits = parse_commit_log(&output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].id, "aaa111");
        assert_eq!(commits[0].parent_id.as_deref(), Some("bbb222"));
        assert_eq!(commits[0].message, "fix parser");
        assert_eq!(commits[1].parent_id, None);
        assert_eq!(commits[1].timestamp, 1700000000);
    }

    #[test]
    fn test_parse_name_status() {
        let output = "A\tsrc/new.py\nM\tsrc/changed.py\nD\tsrc/gone.py\nR100\told.py\tnew.py\n";
        let changes = parse_name_status(output);
        assert_eq!(
            changes,
            vec![
                (ChangeKind::Added, "src/new.py".to_string()),
                (ChangeKind::Modified, "src/changed.py".to_string()),
                (ChangeKind::Deleted, "src/gone.py".to_string()),
                (ChangeKind::Renamed, "new.py".to_string()),
            ]
        );
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("ab", 4), "ab");
    }

    #[test]
    fn test_extract_commits_idempotent_via_store() {
        // Drive the store-side checks without a real repository
        let store = GraphStore::open_in_memory().unwrap();
        let repo_id = store.register_repo("app", "/tmp/app", None).unwrap();

        let commit = CommitRecord {
            id: "aaa111".into(),
            parent_id: None,
            author: "Ada".into(),
            timestamp: 1700000000,
            message: "initial".into(),
        };
        for _ in 0..2 {
            if !store.version_exists(repo_id, &commit.id).unwrap() {
                store
                    .insert_version(
                        repo_id,
                        &commit.id,
                        commit.timestamp,
                        &commit.author,
                        &commit.message,
                    )
                    .unwrap();
            }
        }
        assert_eq!(store.count_versions(repo_id).unwrap(), 1);
    }

    #[test]
    fn test_change_kind_statuses() {
        assert_eq!(ChangeKind::from_status("A"), Some(ChangeKind::Added));
        assert_eq!(ChangeKind::from_status("R086"), Some(ChangeKind::Renamed));
        assert_eq!(ChangeKind::from_status("X"), None);
    }
}
