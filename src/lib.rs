//! # Codeatlas - Local code-intelligence index
//!
//! Codeatlas scans a source tree, extracts symbols and relationships, and
//! answers structural and semantic questions against a persistent store:
//! - Tiered symbol extraction (native tree-sitter parse, generic grammar
//!   parse, regex heuristics) behind one capability interface
//! - Incremental, hash-gated indexing into a SQLite symbol/edge graph
//! - Embedding-backed semantic search with a pluggable provider
//! - Git-history ingestion into durable change events
//! - Configuration-file tree parsing and diffing

pub mod config;
pub mod config_tree;
pub mod embed;
pub mod extract;
pub mod history;
pub mod index;
pub mod language;
pub mod progress;
pub mod query;
pub mod server;
pub mod store;
pub mod symbol;

// Re-exports for convenient access
pub use embed::EmbeddingProvider;
pub use language::Language;
pub use store::GraphStore;
pub use symbol::{ExtractionDepth, ParsedSymbol, SymbolKind};

/// Result type alias for Codeatlas operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Codeatlas operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Repository '{0}' already registered")]
    RepositoryExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Lookup misses are reported to callers as explicit results rather
    /// than failures; everything else propagates.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
