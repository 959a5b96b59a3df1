//! Documentation ingestion.
//!
//! Markdown/reStructuredText/plain-text files become `doc` blobs with a
//! full-text entry and one documentation embedding. Code-reference
//! tokens in the text (`src/sample.py`) that resolve against already
//! indexed files produce DOCS edges from the blob to the file,
//! deduplicated within the pass.

use crate::embed::{EmbeddingProvider, INDEX_KIND_DOCS};
use crate::store::{EdgeType, GraphStore, NewEmbedding};
use crate::Result;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "rst", "txt"];

/// Longest prefix of a document fed to the embedding provider.
const EMBED_TEXT_LIMIT: usize = 2000;

fn code_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Path-ish tokens with an extension: src/sample.py, lib/db.ts
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9_/.-]+\.[A-Za-z0-9_]+").unwrap())
}

/// Counts for one documentation ingestion run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DocsSummary {
    pub documents: usize,
    pub links: usize,
}

/// Ingest documentation files under the given paths.
pub fn ingest_documents(
    store: &mut GraphStore,
    provider: Option<&dyn EmbeddingProvider>,
    repo_root: &Path,
    paths: &[PathBuf],
    repo_id: Option<i64>,
) -> Result<DocsSummary> {
    let mut summary = DocsSummary::default();

    for doc_path in discover_documents(paths) {
        let text = match std::fs::read_to_string(&doc_path) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(path = %doc_path.display(), error = %err, "unreadable document");
                continue;
            }
        };

        let rel_path = doc_path
            .strip_prefix(repo_root)
            .unwrap_or(&doc_path)
            .to_string_lossy()
            .replace('\\', "/");
        let lang_tag = doc_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        let blob_id = store.replace_blob("doc", &text, lang_tag.as_deref(), &rel_path)?;

        if let Some(provider) = provider {
            let preview: String = text.chars().take(EMBED_TEXT_LIMIT).collect();
            match provider.embed(&[preview]) {
                Ok(mut vectors) if !vectors.is_empty() => {
                    let vector = vectors.remove(0);
                    store.insert_embedding(&NewEmbedding {
                        blob_id: Some(blob_id),
                        symbol_id: None,
                        vector: &vector,
                        index_kind: INDEX_KIND_DOCS,
                        repo_id,
                        file_id: None,
                        fqn: None,
                        start_line: None,
                        end_line: None,
                    })?;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(path = %rel_path, error = %err, "doc embedding skipped");
                }
            }
        }

        summary.links += link_code_references(store, blob_id, &text, repo_id)?;
        summary.documents += 1;
    }

    Ok(summary)
}

/// One DOCS edge per referenced file, at most once per blob.
fn link_code_references(
    store: &GraphStore,
    blob_id: i64,
    text: &str,
    repo_id: Option<i64>,
) -> Result<usize> {
    let matches: HashSet<&str> = code_reference_pattern()
        .find_iter(text)
        .map(|m| m.as_str())
        .collect();

    let mut linked: HashSet<i64> = HashSet::new();
    let mut links = 0;
    for reference in matches {
        let Some(file) = store.file_by_path_suffix(repo_id, reference)? else {
            continue;
        };
        if linked.insert(file.id) {
            store.insert_edge(blob_id, EdgeType::Docs, file.id)?;
            links += 1;
        }
    }
    Ok(links)
}

fn discover_documents(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let walker = ignore::WalkBuilder::new(path)
                .hidden(false)
                .require_git(false)
                .build();
            for entry in walker.filter_map(|e| e.ok()) {
                let p = entry.into_path();
                if p.is_file() && is_document(&p) {
                    out.push(p);
                }
            }
        } else if path.is_file() && is_document(path) {
            out.push(path.clone());
        }
    }
    out.sort();
    out
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| DOCUMENT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexOptions, IndexingPipeline};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_doc_link_to_indexed_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("sample.py"), "def run():\n    return True\n").unwrap();

        let docs = dir.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(
            docs.join("guide.md"),
            "This references src/sample.py so it should link to code.",
        )
        .unwrap();

        let mut store = GraphStore::open_in_memory().unwrap();
        IndexingPipeline::new(&mut store)
            .index_paths(dir.path(), &[src], &IndexOptions::default())
            .unwrap();

        let summary =
            ingest_documents(&mut store, None, dir.path(), &[docs], None).unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.links, 1);
        assert_eq!(store.count_blobs("doc").unwrap(), 1);
        assert_eq!(store.count_edges(Some(EdgeType::Docs)).unwrap(), 1);
    }

    #[test]
    fn test_reingest_replaces_blob_and_links() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("guide.md");
        fs::write(&doc, "standalone notes, no code references").unwrap();

        let mut store = GraphStore::open_in_memory().unwrap();
        ingest_documents(&mut store, None, dir.path(), &[doc.clone()], None).unwrap();
        ingest_documents(&mut store, None, dir.path(), &[doc], None).unwrap();

        assert_eq!(store.count_blobs("doc").unwrap(), 1);
    }

    #[test]
    fn test_unresolved_references_produce_no_edges() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("guide.md");
        fs::write(&doc, "mentions missing/ghost.py here").unwrap();

        let mut store = GraphStore::open_in_memory().unwrap();
        let summary =
            ingest_documents(&mut store, None, dir.path(), &[doc], None).unwrap();
        assert_eq!(summary.links, 0);
        assert_eq!(store.count_edges(Some(EdgeType::Docs)).unwrap(), 0);
    }
}
