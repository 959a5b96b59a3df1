//! Incremental indexing pipeline.
//!
//! Discovery walks the path set (gitignore-aware), every candidate file
//! gets a blake3 content digest, and unchanged files cost exactly one
//! digest comparison. Changed files are parsed on worker threads and a
//! single writer applies each file's delete-then-reinsert inside one
//! transaction, so a crash mid-run never leaves a half-updated file.

pub mod docs;

use crate::embed::{symbol_embedding_text, EmbeddingProvider, INDEX_KIND_CODE};
use crate::extract::TieredExtractor;
use crate::language::Language;
use crate::progress::{IndexEvent, NullReporter, ProgressReporter};
use crate::store::{FileIndexRequest, GraphStore, NewEmbedding};
use crate::symbol::{ExtractedFile, ExtractionDepth};
use crate::Result;
use ignore::WalkBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub repo_id: Option<i64>,
    pub force_reindex: bool,
    pub generate_embeddings: bool,
    pub depth: ExtractionDepth,
    /// Parse worker threads; 0 means "use available parallelism".
    pub workers: usize,
}

/// Counts accumulated over one indexing run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IndexSummary {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub symbols_indexed: usize,
    pub call_edges: usize,
    pub import_edges: usize,
    pub embeddings: usize,
}

/// Counts for one configuration indexing run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ConfigIndexSummary {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub nodes_indexed: usize,
}

/// One discovered source file.
#[derive(Debug, Clone)]
struct ScannedFile {
    abs_path: PathBuf,
    rel_path: String,
    language: Language,
}

/// Message from a parse worker to the writer (coordinator).
enum WorkerMessage {
    Parsed {
        file: ScannedFile,
        hash: String,
        extraction: ExtractedFile,
    },
    Unchanged {
        rel_path: String,
    },
    Failed {
        rel_path: String,
        reason: String,
    },
}

/// The incremental indexing pipeline.
pub struct IndexingPipeline<'a> {
    store: &'a mut GraphStore,
    extractor: TieredExtractor,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<'a> IndexingPipeline<'a> {
    pub fn new(store: &'a mut GraphStore) -> Self {
        Self {
            store,
            extractor: TieredExtractor::with_default_tiers(),
            provider: None,
            reporter: Arc::new(NullReporter),
        }
    }

    /// Inject the embedding capability. Without one, embedding requests
    /// degrade to "skip embeddings".
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Index source files under the given paths. Directories are walked
    /// recursively; only files with a known language are visited.
    pub fn index_paths(
        &mut self,
        root: &Path,
        paths: &[PathBuf],
        options: &IndexOptions,
    ) -> Result<IndexSummary> {
        let files = discover_source_files(root, paths);
        self.reporter
            .report(&IndexEvent::ScanFinished { total: files.len() });

        let known_hashes = self.store.file_hashes(options.repo_id)?;
        let worker_count = effective_workers(options.workers, files.len());

        let extractor = &self.extractor;
        let force = options.force_reindex;
        let known = &known_hashes;

        let mut summary = IndexSummary::default();
        let mut embed_jobs: Vec<EmbedJob> = Vec::new();
        // Import resolution is deferred until every file of the pass is
        // written, so visit order cannot hide a dependency.
        let mut import_jobs: Vec<(i64, Vec<String>)> = Vec::new();

        std::thread::scope(|scope| -> Result<()> {
            let (work_tx, work_rx) = crossbeam::channel::unbounded::<ScannedFile>();
            let (msg_tx, msg_rx) = crossbeam::channel::unbounded::<WorkerMessage>();

            for _ in 0..worker_count {
                let work_rx = work_rx.clone();
                let msg_tx = msg_tx.clone();
                scope.spawn(move || {
                    while let Ok(file) = work_rx.recv() {
                        let message = process_file(extractor, known, force, file);
                        if msg_tx.send(message).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(work_rx);
            drop(msg_tx);

            for file in files {
                // Workers only stop when this side hangs up first
                let _ = work_tx.send(file);
            }
            drop(work_tx);

            for message in msg_rx.iter() {
                match message {
                    WorkerMessage::Unchanged { rel_path } => {
                        summary.files_skipped += 1;
                        self.reporter
                            .report(&IndexEvent::FileSkipped { path: rel_path });
                    }
                    WorkerMessage::Failed { rel_path, reason } => {
                        summary.files_failed += 1;
                        tracing::warn!(path = %rel_path, reason = %reason, "file excluded");
                        self.reporter.report(&IndexEvent::FileFailed {
                            path: rel_path,
                            reason,
                        });
                    }
                    WorkerMessage::Parsed {
                        file,
                        hash,
                        extraction,
                    } => {
                        let mut symbols = extraction.symbols;
                        if options.depth == ExtractionDepth::TopLevel {
                            symbols.retain(|s| s.parent.is_none());
                        }
                        let module_name = module_name_of(&file.rel_path);
                        let request = FileIndexRequest {
                            repo_id: options.repo_id,
                            path: &file.rel_path,
                            language: Some(file.language.as_str()),
                            hash: &hash,
                            module_name: &module_name,
                            symbols: &symbols,
                        };
                        match self.store.apply_file_index(&request) {
                            Ok(outcome) => {
                                summary.files_indexed += 1;
                                summary.symbols_indexed += symbols.len();
                                summary.call_edges += outcome.call_edges;
                                if !extraction.imports.is_empty() {
                                    import_jobs.push((outcome.file_id, extraction.imports));
                                }
                                self.reporter.report(&IndexEvent::FileIndexed {
                                    path: file.rel_path.clone(),
                                    symbols: symbols.len(),
                                });
                                if options.generate_embeddings && self.provider.is_some() {
                                    embed_jobs.push(EmbedJob {
                                        file_id: outcome.file_id,
                                        symbol_ids: outcome.symbol_ids,
                                        fqns: outcome.fqns,
                                        symbols,
                                    });
                                }
                            }
                            Err(err) => {
                                summary.files_failed += 1;
                                tracing::warn!(
                                    path = %file.rel_path,
                                    error = %err,
                                    "failed to store extraction"
                                );
                            }
                        }
                    }
                }
            }
            Ok(())
        })?;

        for (file_id, modules) in &import_jobs {
            summary.import_edges += self
                .store
                .link_imports(options.repo_id, *file_id, modules)?;
        }

        if let Some(provider) = self.provider.clone() {
            if options.generate_embeddings && !embed_jobs.is_empty() {
                summary.embeddings =
                    self.generate_embeddings(provider.as_ref(), &embed_jobs, options.repo_id);
            }
        }

        if let Some(repo_id) = options.repo_id {
            self.store.update_repo_indexed(repo_id, None)?;
        }

        Ok(summary)
    }

    /// Embed symbols file by file. A provider failure for one file is
    /// logged and the run continues.
    fn generate_embeddings(
        &mut self,
        provider: &dyn EmbeddingProvider,
        jobs: &[EmbedJob],
        repo_id: Option<i64>,
    ) -> usize {
        let total: usize = jobs.iter().map(|j| j.symbols.len()).sum();
        self.reporter
            .report(&IndexEvent::EmbeddingStarted { total });

        let mut generated = 0;
        for job in jobs {
            let texts: Vec<String> = job
                .symbols
                .iter()
                .zip(&job.fqns)
                .map(|(symbol, fqn)| {
                    symbol_embedding_text(
                        &symbol.name,
                        symbol.signature.as_deref(),
                        fqn,
                        symbol.docstring.as_deref(),
                    )
                })
                .collect();
            if texts.is_empty() {
                continue;
            }
            let vectors = match provider.embed(&texts) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(file_id = job.file_id, error = %err, "embedding skipped");
                    continue;
                }
            };
            for ((symbol, vector), (symbol_id, fqn)) in job
                .symbols
                .iter()
                .zip(vectors)
                .zip(job.symbol_ids.iter().zip(&job.fqns))
            {
                let result = self.store.insert_embedding(&NewEmbedding {
                    blob_id: None,
                    symbol_id: Some(*symbol_id),
                    vector: &vector,
                    index_kind: INDEX_KIND_CODE,
                    repo_id,
                    file_id: Some(job.file_id),
                    fqn: Some(fqn.as_str()),
                    start_line: Some(symbol.start_line as i64),
                    end_line: Some(symbol.end_line as i64),
                });
                match result {
                    Ok(_) => generated += 1,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to store embedding");
                    }
                }
            }
        }

        self.reporter.report(&IndexEvent::EmbeddingFinished);
        generated
    }

    /// Hash-gated configuration indexing: same destructive-then-additive
    /// policy as source files, using the config-tree parser.
    pub fn index_config_paths(
        &mut self,
        root: &Path,
        paths: &[PathBuf],
        options: &IndexOptions,
    ) -> Result<ConfigIndexSummary> {
        let mut summary = ConfigIndexSummary::default();

        for abs_path in discover_config_files(root, paths) {
            let rel_path = relative_path(root, &abs_path);
            let Some(format) = crate::config_tree::ConfigFormat::detect(&abs_path) else {
                continue;
            };
            let content = match std::fs::read_to_string(&abs_path) {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(path = %rel_path, error = %err, "unreadable config file");
                    continue;
                }
            };
            let hash = blake3::hash(content.as_bytes()).to_hex().to_string();

            if !options.force_reindex {
                if let Some(existing) = self.store.config_file_by_path(options.repo_id, &rel_path)? {
                    if existing.hash == hash {
                        summary.files_skipped += 1;
                        self.reporter
                            .report(&IndexEvent::FileSkipped { path: rel_path });
                        continue;
                    }
                }
            }

            let Some(tree) = crate::config_tree::parse_config_str(&rel_path, format, &content)
            else {
                continue;
            };
            self.store.replace_config_tree(
                options.repo_id,
                None,
                &rel_path,
                format.as_str(),
                &content,
                &hash,
                &tree.nodes,
            )?;
            summary.files_indexed += 1;
            summary.nodes_indexed += tree.nodes.len();
            self.reporter.report(&IndexEvent::FileIndexed {
                path: rel_path,
                symbols: tree.nodes.len(),
            });
        }

        Ok(summary)
    }
}

struct EmbedJob {
    file_id: i64,
    symbol_ids: Vec<i64>,
    fqns: Vec<String>,
    symbols: Vec<crate::symbol::ParsedSymbol>,
}

/// Read, hash, gate, and parse one file on a worker thread.
fn process_file(
    extractor: &TieredExtractor,
    known_hashes: &HashMap<String, String>,
    force: bool,
    file: ScannedFile,
) -> WorkerMessage {
    let bytes = match std::fs::read(&file.abs_path) {
        Ok(b) => b,
        Err(err) => {
            return WorkerMessage::Failed {
                rel_path: file.rel_path,
                reason: format!("read failed: {}", err),
            };
        }
    };
    let hash = blake3::hash(&bytes).to_hex().to_string();
    if !force && known_hashes.get(&file.rel_path) == Some(&hash) {
        return WorkerMessage::Unchanged {
            rel_path: file.rel_path,
        };
    }
    let source = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => {
            return WorkerMessage::Failed {
                rel_path: file.rel_path,
                reason: "not valid utf-8".to_string(),
            };
        }
    };
    let extraction = extractor.extract(file.language, &source);
    WorkerMessage::Parsed {
        file,
        hash,
        extraction,
    }
}

fn effective_workers(requested: usize, files: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let count = if requested == 0 { available } else { requested };
    count.clamp(1, files.max(1))
}

fn module_name_of(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| rel_path.to_string())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Expand the path set: directories recurse (gitignore-aware), single
/// files pass through. Only files with a known language survive.
fn discover_source_files(root: &Path, paths: &[PathBuf]) -> Vec<ScannedFile> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for candidate in expand_paths(paths) {
        let Some(language) = Language::detect(&candidate) else {
            continue;
        };
        let rel_path = relative_path(root, &candidate);
        if seen.insert(rel_path.clone()) {
            files.push(ScannedFile {
                abs_path: candidate,
                rel_path,
                language,
            });
        }
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

fn discover_config_files(root: &Path, paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for candidate in expand_paths(paths) {
        if crate::config_tree::ConfigFormat::detect(&candidate).is_none() {
            continue;
        }
        if seen.insert(relative_path(root, &candidate)) {
            files.push(candidate);
        }
    }
    files.sort();
    files
}

fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let walker = WalkBuilder::new(path)
                .hidden(false)
                .require_git(false)
                .build();
            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(err) => {
                        tracing::warn!(error = %err, "walk error");
                        continue;
                    }
                };
                if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    out.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            out.push(path.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::StubProvider;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn index(
        store: &mut GraphStore,
        root: &Path,
        options: &IndexOptions,
    ) -> IndexSummary {
        IndexingPipeline::new(store)
            .index_paths(root, &[root.to_path_buf()], options)
            .unwrap()
    }

    #[test]
    fn test_end_to_end_python_counts() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "example.py",
            "def alpha():\n    pass\n\n\nclass Beta:\n    def method(self):\n        return 1\n",
        );

        let mut store = GraphStore::open_in_memory().unwrap();
        let summary = index(&mut store, dir.path(), &IndexOptions::default());

        // Default depth policy stores top-level symbols only
        assert_eq!(summary.files_indexed, 1);
        assert_eq!(summary.symbols_indexed, 2);
        assert_eq!(store.count_symbols().unwrap(), 2);
    }

    #[test]
    fn test_nested_depth_stores_methods() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "example.py",
            "class Beta:\n    def method(self):\n        return 1\n",
        );

        let mut store = GraphStore::open_in_memory().unwrap();
        let options = IndexOptions {
            depth: ExtractionDepth::Nested,
            ..Default::default()
        };
        let summary = index(&mut store, dir.path(), &options);
        assert_eq!(summary.symbols_indexed, 2);

        let file = store.file_by_path(None, "example.py").unwrap().unwrap();
        let symbols = store.symbols_in_file(file.id).unwrap();
        let method = symbols.iter().find(|s| s.name == "method").unwrap();
        let beta = symbols.iter().find(|s| s.name == "Beta").unwrap();
        assert_eq!(method.parent_id, Some(beta.id));
        // parent span encloses the child span
        assert!(beta.start_line <= method.start_line);
        assert!(beta.end_line >= method.end_line);
    }

    #[test]
    fn test_idempotent_reindex() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "one.py", "def alpha():\n    beta()\n\ndef beta():\n    pass\n");

        let mut store = GraphStore::open_in_memory().unwrap();
        let first = index(&mut store, dir.path(), &IndexOptions::default());
        assert_eq!(first.files_indexed, 1);
        let symbols_after_first = store.count_symbols().unwrap();
        let edges_after_first = store.count_edges(None).unwrap();

        let second = index(&mut store, dir.path(), &IndexOptions::default());
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 1);
        assert_eq!(store.count_symbols().unwrap(), symbols_after_first);
        assert_eq!(store.count_edges(None).unwrap(), edges_after_first);
    }

    #[test]
    fn test_forced_reindex_recreates_rows() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "one.py", "def alpha():\n    pass\n");

        let mut store = GraphStore::open_in_memory().unwrap();
        index(&mut store, dir.path(), &IndexOptions::default());
        let file = store.file_by_path(None, "one.py").unwrap().unwrap();
        let before: Vec<i64> = store
            .symbols_in_file(file.id)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();

        let options = IndexOptions {
            force_reindex: true,
            ..Default::default()
        };
        let summary = index(&mut store, dir.path(), &options);
        assert_eq!(summary.files_indexed, 1);

        let after: Vec<i64> = store
            .symbols_in_file(file.id)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(before.len(), after.len());
        assert_ne!(before, after);
    }

    #[test]
    fn test_import_edges_between_files() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "util.py", "def helper():\n    pass\n");
        write_file(&dir, "main.py", "import util\n\ndef run():\n    pass\n");

        let mut store = GraphStore::open_in_memory().unwrap();
        let summary = index(&mut store, dir.path(), &IndexOptions::default());
        assert_eq!(summary.import_edges, 1);

        let main = store.file_by_path(None, "main.py").unwrap().unwrap();
        let util = store.file_by_path(None, "util.py").unwrap().unwrap();
        let deps = store
            .edge_neighbors(main.id, crate::store::EdgeType::Imports, true)
            .unwrap();
        assert_eq!(deps, vec![util.id]);
    }

    #[test]
    fn test_embeddings_generated_with_provider() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "one.py", "def alpha():\n    pass\n\ndef beta():\n    pass\n");

        let mut store = GraphStore::open_in_memory().unwrap();
        let options = IndexOptions {
            generate_embeddings: true,
            ..Default::default()
        };
        let summary = IndexingPipeline::new(&mut store)
            .with_provider(Arc::new(StubProvider { dim: 8 }))
            .index_paths(dir.path(), &[dir.path().to_path_buf()], &options)
            .unwrap();
        assert_eq!(summary.embeddings, 2);
        assert_eq!(store.count_embeddings().unwrap(), 2);
    }

    #[test]
    fn test_unknown_extensions_skipped() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "notes.txt", "not code");
        write_file(&dir, "one.py", "def alpha():\n    pass\n");

        let mut store = GraphStore::open_in_memory().unwrap();
        let summary = index(&mut store, dir.path(), &IndexOptions::default());
        assert_eq!(summary.files_indexed, 1);
    }

    #[test]
    fn test_config_indexing_hash_gated() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "settings.json", r#"{"debug": true, "port": 8080}"#);

        let mut store = GraphStore::open_in_memory().unwrap();
        let options = IndexOptions::default();
        let first = IndexingPipeline::new(&mut store)
            .index_config_paths(dir.path(), &[dir.path().to_path_buf()], &options)
            .unwrap();
        assert_eq!(first.files_indexed, 1);
        assert_eq!(first.nodes_indexed, 2);

        let second = IndexingPipeline::new(&mut store)
            .index_config_paths(dir.path(), &[dir.path().to_path_buf()], &options)
            .unwrap();
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 1);
    }
}
