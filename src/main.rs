//! Codeatlas CLI - local code-intelligence index for one workstation

use clap::{Parser, Subcommand};
use codeatlas::config::{default_database_path_in, ensure_db_dir, ensure_gitignore, load_config};
use codeatlas::embed::FastembedProvider;
use codeatlas::index::{docs::ingest_documents, IndexOptions, IndexingPipeline};
use codeatlas::progress::{IndexEvent, ProgressReporter};
use codeatlas::query::{Direction, QueryEngine};
use codeatlas::store::GraphStore;
use codeatlas::symbol::ExtractionDepth;
use codeatlas::EmbeddingProvider;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "codeatlas")]
#[command(version)]
#[command(about = "Local code-intelligence index: symbols, call graphs, git history, semantic search")]
#[command(long_about = r#"
Codeatlas builds a persistent symbol graph from your source tree:
  • Incremental, hash-gated indexing with tiered parsers
  • Call graphs, import dependencies, symbol hierarchies
  • Semantic search over code and documentation
  • Git history as durable change events
  • Configuration tree parsing and diffing

Example usage:
  codeatlas repo add --name app --path .
  codeatlas index --repo app .
  codeatlas search --query "token validation" --semantic
  codeatlas calls --symbol validate_token --backward
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the database file (defaults to .codeatlas/codeatlas.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Index source files into the symbol graph
    Index {
        /// Files or directories to index
        paths: Vec<PathBuf>,

        /// Repository name to index into
        #[arg(short, long)]
        repo: Option<String>,

        /// Re-extract files even when their digest is unchanged
        #[arg(short, long)]
        force: bool,

        /// Generate embeddings for extracted symbols
        #[arg(short, long)]
        embeddings: bool,

        /// Store the full nested symbol tree instead of top-level only
        #[arg(long)]
        nested: bool,

        /// Parse worker threads (0 = auto)
        #[arg(long, default_value = "0")]
        workers: usize,
    },

    /// Ingest documentation files and link them to indexed code
    Docs {
        /// Documentation files or directories
        paths: Vec<PathBuf>,

        /// Repository root used when resolving code references
        #[arg(long, default_value = ".")]
        repo_root: PathBuf,

        /// Repository name to ingest into
        #[arg(short, long)]
        repo: Option<String>,

        /// Generate documentation embeddings
        #[arg(short, long)]
        embeddings: bool,
    },

    /// Index configuration files into key-path trees
    Config {
        /// Configuration files or directories
        paths: Vec<PathBuf>,

        /// Repository name to index into
        #[arg(short, long)]
        repo: Option<String>,

        /// Re-parse files even when their digest is unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Extract git history into commits and change events
    History {
        /// Repository name (must be registered with its root path)
        #[arg(short, long)]
        repo: String,

        /// Only extract commits after this SHA
        #[arg(long)]
        since: Option<String>,
    },

    /// Search indexed symbols
    Search {
        /// Search query
        #[arg(short, long)]
        query: String,

        /// Use embedding-based semantic search
        #[arg(short, long)]
        semantic: bool,

        /// Search documentation instead of code
        #[arg(long)]
        docs: bool,

        /// Repository name filter
        #[arg(short, long)]
        repo: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the symbol hierarchy of a file
    Tree {
        /// File path (suffix match allowed)
        file: String,

        /// Repository name filter
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Show the call graph of a symbol
    Calls {
        /// Symbol name
        symbol: String,

        /// Traverse callers instead of callees
        #[arg(short, long)]
        backward: bool,

        /// Maximum traversal depth
        #[arg(long, default_value = "3")]
        depth: usize,

        /// Repository name filter
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Show the import dependencies of a file
    Deps {
        /// File path (suffix match allowed)
        file: String,

        /// Maximum traversal depth
        #[arg(long, default_value = "1")]
        depth: usize,

        /// Repository name filter
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Diff two configuration files
    ConfigDiff {
        /// Old configuration file
        old: PathBuf,

        /// New configuration file
        new: PathBuf,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Register a repository
    Add {
        /// Unique repository name
        #[arg(short, long)]
        name: String,

        /// Repository root path
        #[arg(short, long)]
        path: PathBuf,

        /// Default branch name
        #[arg(long)]
        branch: Option<String>,
    },
    /// List registered repositories
    List,
    /// Show statistics for a repository
    Stats {
        /// Repository name
        name: String,
    },
    /// Remove a repository registration
    Remove {
        /// Repository name
        name: String,
    },
}

/// Renders pipeline events as an indicatif bar when stdout is a
/// terminal, and stays silent otherwise.
struct IndicatifReporter {
    bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let bar = if console::Term::stdout().is_term() {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: &IndexEvent) {
        match event {
            IndexEvent::ScanFinished { total } => self.bar.set_length(*total as u64),
            IndexEvent::FileIndexed { path, .. } => {
                self.bar.inc(1);
                self.bar.set_message(path.clone());
            }
            IndexEvent::FileSkipped { .. } | IndexEvent::FileFailed { .. } => self.bar.inc(1),
            IndexEvent::EmbeddingStarted { total } => {
                self.bar.set_message(format!("embedding {} symbols", total));
            }
            IndexEvent::EmbeddingFinished => self.bar.set_message("embeddings done"),
        }
    }
}

fn open_store(database: Option<&Path>) -> anyhow::Result<GraphStore> {
    let db_path = match database {
        Some(path) => path.to_path_buf(),
        None => {
            let config = load_config(None)?;
            config
                .and_then(|c| c.database.map(PathBuf::from))
                .unwrap_or_else(|| default_database_path_in(Path::new(".")))
        }
    };
    ensure_db_dir(&db_path)?;
    Ok(GraphStore::open(&db_path)?)
}

fn repo_id_for(store: &GraphStore, name: Option<&str>) -> anyhow::Result<Option<i64>> {
    match name {
        None => Ok(None),
        Some(name) => {
            let repo = store
                .repo_by_name(name)?
                .ok_or_else(|| anyhow::anyhow!("repository '{}' is not registered", name))?;
            Ok(Some(repo.id))
        }
    }
}

/// Build the embedding provider, degrading to None on failure.
fn try_provider() -> Option<Arc<dyn EmbeddingProvider>> {
    match FastembedProvider::new() {
        Ok(provider) => Some(Arc::new(provider)),
        Err(err) => {
            tracing::warn!(error = %err, "embedding provider unavailable, skipping embeddings");
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Repo { command } => run_repo(command, cli.database.as_deref())?,

        Commands::Index {
            paths,
            repo,
            force,
            embeddings,
            nested,
            workers,
        } => {
            let mut store = open_store(cli.database.as_deref())?;
            let repo_id = repo_id_for(&store, repo.as_deref())?;
            let root = std::env::current_dir()?;
            let paths = if paths.is_empty() {
                vec![root.clone()]
            } else {
                paths
            };

            let options = IndexOptions {
                repo_id,
                force_reindex: force,
                generate_embeddings: embeddings,
                depth: if nested {
                    ExtractionDepth::Nested
                } else {
                    ExtractionDepth::TopLevel
                },
                workers,
            };

            let reporter = Arc::new(IndicatifReporter::new());
            let mut pipeline =
                IndexingPipeline::new(&mut store).with_reporter(reporter.clone());
            if embeddings {
                if let Some(provider) = try_provider() {
                    pipeline = pipeline.with_provider(provider);
                }
            }
            let summary = pipeline.index_paths(&root, &paths, &options)?;
            reporter.finish();

            println!(
                "Indexed {} files ({} skipped, {} failed): {} symbols, {} call edges, {} import edges",
                summary.files_indexed,
                summary.files_skipped,
                summary.files_failed,
                summary.symbols_indexed,
                summary.call_edges,
                summary.import_edges,
            );
            if embeddings {
                println!("Embeddings generated: {}", summary.embeddings);
            }
        }

        Commands::Docs {
            paths,
            repo_root,
            repo,
            embeddings,
        } => {
            let mut store = open_store(cli.database.as_deref())?;
            let repo_id = repo_id_for(&store, repo.as_deref())?;
            let provider = if embeddings { try_provider() } else { None };
            let summary = ingest_documents(
                &mut store,
                provider.as_deref(),
                &repo_root,
                &paths,
                repo_id,
            )?;
            println!(
                "Ingested {} documents, {} doc-to-code links",
                summary.documents, summary.links
            );
        }

        Commands::Config { paths, repo, force } => {
            let mut store = open_store(cli.database.as_deref())?;
            let repo_id = repo_id_for(&store, repo.as_deref())?;
            let root = std::env::current_dir()?;
            let options = IndexOptions {
                repo_id,
                force_reindex: force,
                ..Default::default()
            };
            let summary =
                IndexingPipeline::new(&mut store).index_config_paths(&root, &paths, &options)?;
            println!(
                "Indexed {} config files ({} skipped): {} nodes",
                summary.files_indexed, summary.files_skipped, summary.nodes_indexed
            );
        }

        Commands::History { repo, since } => {
            let store = open_store(cli.database.as_deref())?;
            let record = store
                .repo_by_name(&repo)?
                .ok_or_else(|| anyhow::anyhow!("repository '{}' is not registered", repo))?;
            let repo_path = PathBuf::from(&record.root_path);

            let commits = codeatlas::history::extract_commits(
                &store,
                record.id,
                &repo_path,
                since.as_deref(),
            )?;
            let changes =
                codeatlas::history::extract_changes(&store, record.id, &repo_path)?;
            let latest = codeatlas::history::read_commit_log(&repo_path)?
                .first()
                .map(|c| c.id.clone());
            store.update_repo_indexed(record.id, latest.as_deref())?;
            println!("Extracted {} commits, {} change events", commits, changes);
        }

        Commands::Search {
            query,
            semantic,
            docs,
            repo,
            limit,
        } => {
            let store = open_store(cli.database.as_deref())?;
            let repo_id = repo_id_for(&store, repo.as_deref())?;

            if semantic {
                let provider = try_provider()
                    .ok_or_else(|| anyhow::anyhow!("embedding provider unavailable"))?;
                let hits = if docs {
                    codeatlas::embed::search_docs_semantic(
                        &store,
                        provider.as_ref(),
                        &query,
                        repo_id,
                        limit,
                    )?
                } else {
                    codeatlas::embed::search_code_semantic(
                        &store,
                        provider.as_ref(),
                        &query,
                        repo_id,
                        limit,
                    )?
                };
                if hits.is_empty() {
                    println!("No results.");
                }
                for hit in hits {
                    match &hit.path {
                        Some(path) => {
                            println!("{:.3}  {}  ({})", hit.score, hit.identifier, path)
                        }
                        None => println!("{:.3}  {}", hit.score, hit.identifier),
                    }
                }
            } else if docs {
                for (id, preview, path) in store.search_docs(&query, limit)? {
                    println!(
                        "doc_{}  {}  {}",
                        id,
                        path.unwrap_or_default(),
                        preview.replace('\n', " ")
                    );
                }
            } else {
                let engine = QueryEngine::new(&store);
                let grouped = engine.search_repositories(&query, limit)?;
                if grouped.is_empty() {
                    println!("No results.");
                }
                for (repo_name, hits) in grouped {
                    println!("{}:", repo_name);
                    for hit in hits {
                        println!(
                            "  [{}] {} ({}:{})",
                            hit.kind, hit.fqn, hit.path, hit.start_line
                        );
                    }
                }
            }
        }

        Commands::Tree { file, repo } => {
            let store = open_store(cli.database.as_deref())?;
            let repo_id = repo_id_for(&store, repo.as_deref())?;
            let engine = QueryEngine::new(&store);
            let tree = engine.symbol_tree(repo_id, &file)?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }

        Commands::Calls {
            symbol,
            backward,
            depth,
            repo,
        } => {
            let store = open_store(cli.database.as_deref())?;
            let repo_id = repo_id_for(&store, repo.as_deref())?;
            let direction = if backward {
                Direction::Backward
            } else {
                Direction::Forward
            };
            let engine = QueryEngine::new(&store);
            let graph = engine.call_graph(repo_id, &symbol, direction, depth)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }

        Commands::Deps { file, depth, repo } => {
            let store = open_store(cli.database.as_deref())?;
            let repo_id = repo_id_for(&store, repo.as_deref())?;
            let engine = QueryEngine::new(&store);
            let graph = engine.dependency_graph(repo_id, &file, depth)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }

        Commands::ConfigDiff { old, new } => {
            let old_tree = codeatlas::config_tree::parse_config_file(&old)?
                .ok_or_else(|| anyhow::anyhow!("{} is not an indexable config", old.display()))?;
            let new_tree = codeatlas::config_tree::parse_config_file(&new)?
                .ok_or_else(|| anyhow::anyhow!("{} is not an indexable config", new.display()))?;
            let diff = codeatlas::config_tree::diff_trees(&old_tree, &new_tree);
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
    }

    Ok(())
}

fn run_repo(command: RepoCommands, database: Option<&Path>) -> anyhow::Result<()> {
    let store = open_store(database)?;
    match command {
        RepoCommands::Add { name, path, branch } => {
            let root = path.canonicalize().unwrap_or(path);
            let id = store.register_repo(
                &name,
                &root.to_string_lossy(),
                branch.as_deref(),
            )?;
            ensure_gitignore(&root).ok();
            println!("Registered repository '{}' (id {})", name, id);
        }
        RepoCommands::List => {
            let repos = store.list_repos()?;
            if repos.is_empty() {
                println!("No repositories registered.");
            }
            for repo in repos {
                println!(
                    "{}  {}  (branch: {}, last commit: {})",
                    repo.name,
                    repo.root_path,
                    repo.default_branch.as_deref().unwrap_or("-"),
                    repo.last_commit
                        .as_deref()
                        .map(|c| &c[..c.len().min(8)])
                        .unwrap_or("-"),
                );
            }
        }
        RepoCommands::Stats { name } => {
            let repo = store
                .repo_by_name(&name)?
                .ok_or_else(|| anyhow::anyhow!("repository '{}' is not registered", name))?;
            let stats = store.repo_stats(repo.id)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        RepoCommands::Remove { name } => {
            if store.remove_repo(&name)? {
                println!("Removed repository '{}'", name);
            } else {
                println!("Repository '{}' is not registered.", name);
            }
        }
    }
    Ok(())
}
