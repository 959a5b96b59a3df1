//! SQLite-backed graph store.
//!
//! Sole writer and single source of truth for the persisted data model:
//! repositories, files, symbols, typed edges, documentation blobs,
//! embeddings, commit metadata, change events, and configuration trees,
//! plus full-text indexes over identifier tokens and documentation text.
//!
//! The store opens in WAL mode so readers can run while one writer holds
//! a transaction. Per-file re-indexing is delete-then-reinsert inside one
//! transaction, so readers never observe a half-updated file.

pub mod schema;

use crate::config_tree::ConfigNodeRec;
use crate::symbol::ParsedSymbol;
use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Relationship kinds between stored entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    /// symbol -> symbol
    Calls,
    /// file -> file
    Imports,
    /// doc blob -> file
    Docs,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Calls => "CALLS",
            EdgeType::Imports => "IMPORTS",
            EdgeType::Docs => "DOCS",
        }
    }
}

/// A registered repository
#[derive(Debug, Clone, Serialize)]
pub struct RepoRecord {
    pub id: i64,
    pub name: String,
    pub root_path: String,
    pub default_branch: Option<String>,
    pub last_indexed_at: Option<i64>,
    pub last_commit: Option<String>,
}

/// An indexed source file
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub repo_id: Option<i64>,
    pub path: String,
    pub lang: Option<String>,
    pub hash: String,
    pub modname: Option<String>,
}

/// A stored symbol, joined with its file path
#[derive(Debug, Clone, Serialize)]
pub struct SymbolRecord {
    pub id: i64,
    pub file_id: i64,
    pub parent_id: Option<i64>,
    pub kind: String,
    pub name: String,
    pub fqn: String,
    pub start_line: i64,
    pub end_line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    pub path: String,
}

/// A durable record of one file's modification within one commit
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEventRecord {
    pub id: i64,
    pub commit_id: String,
    pub parent_commit_id: Option<String>,
    pub path: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_text: Option<String>,
    pub summary: String,
    pub timestamp: i64,
}

/// A parsed configuration file row
#[derive(Debug, Clone, Serialize)]
pub struct ConfigFileRecord {
    pub id: i64,
    pub repo_id: Option<i64>,
    pub file_id: Option<i64>,
    pub path: String,
    pub format: String,
    pub hash: String,
}

/// A persisted configuration tree node
#[derive(Debug, Clone, Serialize)]
pub struct ConfigNodeRecord {
    pub id: i64,
    pub config_id: i64,
    pub parent_id: Option<i64>,
    pub key: String,
    pub key_path: String,
    pub value: Option<String>,
    pub value_type: String,
    pub line_number: Option<i64>,
}

/// Identifier search hit, grouped by repository at the query layer
#[derive(Debug, Clone, Serialize)]
pub struct IdentifierHit {
    pub symbol_id: i64,
    pub name: String,
    pub fqn: String,
    pub kind: String,
    pub path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub repo: Option<String>,
}

/// A stored vector with enough context to render a search hit
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub id: i64,
    pub symbol_id: Option<i64>,
    pub blob_id: Option<i64>,
    pub vector: Vec<f32>,
    pub fqn: Option<String>,
    pub path: Option<String>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
}

/// New embedding row
#[derive(Debug, Clone)]
pub struct NewEmbedding<'a> {
    pub blob_id: Option<i64>,
    pub symbol_id: Option<i64>,
    pub vector: &'a [f32],
    pub index_kind: &'a str,
    pub repo_id: Option<i64>,
    pub file_id: Option<i64>,
    pub fqn: Option<&'a str>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
}

/// New change event row
#[derive(Debug, Clone)]
pub struct NewChangeEvent<'a> {
    pub commit_id: &'a str,
    pub parent_commit_id: Option<&'a str>,
    pub path: &'a str,
    pub kind: &'a str,
    pub diff_text: Option<&'a str>,
    pub summary: &'a str,
    pub timestamp: i64,
}

/// Everything needed to (re-)index one file atomically
#[derive(Debug)]
pub struct FileIndexRequest<'a> {
    pub repo_id: Option<i64>,
    pub path: &'a str,
    pub language: Option<&'a str>,
    pub hash: &'a str,
    pub module_name: &'a str,
    /// Depth-filtered symbols; parent indices reference this slice and
    /// parents come first.
    pub symbols: &'a [ParsedSymbol],
}

/// Outcome of one per-file transaction
#[derive(Debug)]
pub struct FileIndexOutcome {
    pub file_id: i64,
    pub symbol_ids: Vec<i64>,
    /// Qualified names, parallel to `symbol_ids`
    pub fqns: Vec<String>,
    pub call_edges: usize,
}

/// Per-repository statistics
#[derive(Debug, Serialize)]
pub struct RepoStats {
    pub files: i64,
    pub symbols: i64,
    pub commits: i64,
    pub changes: i64,
    pub embeddings: i64,
    pub documents: i64,
    pub languages: BTreeMap<String, i64>,
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// SQLite-backed storage for the code-intelligence graph
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open a database file (creates if it doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Repository Operations ==========

    /// Register a repository. Duplicate names are rejected before any
    /// mutation occurs.
    pub fn register_repo(
        &self,
        name: &str,
        root_path: &str,
        default_branch: Option<&str>,
    ) -> Result<i64> {
        if self.repo_by_name(name)?.is_some() {
            return Err(Error::RepositoryExists(name.to_string()));
        }
        self.conn.execute(
            "INSERT INTO repo (name, root_path, default_branch) VALUES (?1, ?2, ?3)",
            params![name, root_path, default_branch],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn repo_by_name(&self, name: &str) -> Result<Option<RepoRecord>> {
        self.conn
            .query_row(
                "SELECT id, name, root_path, default_branch, last_indexed_at, last_commit
                 FROM repo WHERE name = ?1",
                [name],
                row_to_repo,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn repo_by_id(&self, id: i64) -> Result<Option<RepoRecord>> {
        self.conn
            .query_row(
                "SELECT id, name, root_path, default_branch, last_indexed_at, last_commit
                 FROM repo WHERE id = ?1",
                [id],
                row_to_repo,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_repos(&self) -> Result<Vec<RepoRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, root_path, default_branch, last_indexed_at, last_commit
             FROM repo ORDER BY name",
        )?;
        let repos = stmt
            .query_map([], row_to_repo)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(repos)
    }

    /// Remove a repository row. Returns false when the name is unknown.
    pub fn remove_repo(&self, name: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM repo WHERE name = ?1", [name])?;
        Ok(removed > 0)
    }

    /// Stamp a repository after a successful index pass.
    pub fn update_repo_indexed(&self, repo_id: i64, last_commit: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE repo SET last_indexed_at = ?1, last_commit = ?2 WHERE id = ?3",
            params![now_epoch(), last_commit, repo_id],
        )?;
        Ok(())
    }

    pub fn repo_stats(&self, repo_id: i64) -> Result<RepoStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [repo_id], |row| row.get(0))?)
        };
        let files = count("SELECT COUNT(*) FROM files WHERE repo_id = ?1")?;
        let symbols = count(
            "SELECT COUNT(*) FROM symbols
             WHERE file_id IN (SELECT id FROM files WHERE repo_id = ?1)",
        )?;
        let commits = count("SELECT COUNT(DISTINCT commit_id) FROM version WHERE repo_id = ?1")?;
        let changes = count("SELECT COUNT(*) FROM change_event WHERE repo_id = ?1")?;
        let embeddings = count("SELECT COUNT(*) FROM emb WHERE repo_id = ?1")?;
        let documents = count(
            "SELECT COUNT(*) FROM blob b
             JOIN emb e ON e.blob_id = b.id
             WHERE e.repo_id = ?1 AND b.kind = 'doc'",
        )?;

        let mut languages = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT lang, COUNT(*) FROM files
             WHERE repo_id = ?1 AND lang IS NOT NULL
             GROUP BY lang",
        )?;
        let rows = stmt.query_map([repo_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows.filter_map(|r| r.ok()) {
            languages.insert(row.0, row.1);
        }

        Ok(RepoStats {
            files,
            symbols,
            commits,
            changes,
            embeddings,
            documents,
            languages,
        })
    }

    // ========== File Operations ==========

    pub fn file_by_path(&self, repo_id: Option<i64>, path: &str) -> Result<Option<FileRecord>> {
        self.conn
            .query_row(
                "SELECT id, repo_id, path, lang, hash, modname
                 FROM files WHERE repo_id IS ?1 AND path = ?2",
                params![repo_id, path],
                row_to_file,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn file_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        self.conn
            .query_row(
                "SELECT id, repo_id, path, lang, hash, modname FROM files WHERE id = ?1",
                [id],
                row_to_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Look up a file by path suffix when the exact relative path is not
    /// known (tool surface convenience).
    pub fn file_by_path_suffix(
        &self,
        repo_id: Option<i64>,
        suffix: &str,
    ) -> Result<Option<FileRecord>> {
        if let Some(exact) = self.file_by_path(repo_id, suffix)? {
            return Ok(Some(exact));
        }
        let pattern = format!("%{}", suffix);
        self.conn
            .query_row(
                "SELECT id, repo_id, path, lang, hash, modname
                 FROM files WHERE (?1 IS NULL OR repo_id IS ?1) AND path LIKE ?2
                 ORDER BY length(path) LIMIT 1",
                params![repo_id, pattern],
                row_to_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Preload the known content digests for change detection: one map
    /// lookup per unchanged file instead of one query.
    pub fn file_hashes(&self, repo_id: Option<i64>) -> Result<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, hash FROM files WHERE repo_id IS ?1")?;
        let rows = stmt.query_map(params![repo_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ========== Indexing (per-file transaction) ==========

    /// Apply one file's extraction atomically: upsert the file row,
    /// delete every child row (symbols, identifier tokens, symbol
    /// embeddings, CALLS and outgoing IMPORTS edges), then insert the
    /// fresh parse. A crash mid-run never leaves a half-updated file
    /// visible to readers.
    pub fn apply_file_index(&mut self, req: &FileIndexRequest) -> Result<FileIndexOutcome> {
        let tx = self.conn.transaction()?;

        // Upsert file row
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM files WHERE repo_id IS ?1 AND path = ?2",
                params![req.repo_id, req.path],
                |row| row.get(0),
            )
            .optional()?;
        let file_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE files SET lang = ?1, hash = ?2, modname = ?3 WHERE id = ?4",
                    params![req.language, req.hash, req.module_name, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO files (repo_id, path, lang, hash, modname)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![req.repo_id, req.path, req.language, req.hash, req.module_name],
                )?;
                tx.last_insert_rowid()
            }
        };

        // Full replacement, never a partial patch
        tx.execute(
            "DELETE FROM ident_fts WHERE symbol_id IN
                 (SELECT id FROM symbols WHERE file_id = ?1)",
            [file_id],
        )?;
        tx.execute(
            "DELETE FROM edges WHERE etype = 'CALLS' AND
                 (src IN (SELECT id FROM symbols WHERE file_id = ?1)
                  OR dst IN (SELECT id FROM symbols WHERE file_id = ?1))",
            [file_id],
        )?;
        tx.execute(
            "DELETE FROM emb WHERE symbol_id IN
                 (SELECT id FROM symbols WHERE file_id = ?1)",
            [file_id],
        )?;
        tx.execute("DELETE FROM symbols WHERE file_id = ?1", [file_id])?;
        tx.execute(
            "DELETE FROM edges WHERE etype = 'IMPORTS' AND src = ?1",
            [file_id],
        )?;

        // Insert symbols in extraction order; parents precede children so
        // parent ids and dotted names resolve in one pass.
        let mut symbol_ids = Vec::with_capacity(req.symbols.len());
        let mut fqns: Vec<String> = Vec::with_capacity(req.symbols.len());
        let mut by_name: HashMap<&str, i64> = HashMap::new();
        for symbol in req.symbols {
            let (parent_id, fqn) = match symbol.parent {
                Some(p) => (
                    Some(symbol_ids[p]),
                    format!("{}.{}", fqns[p], symbol.name),
                ),
                None => (None, format!("{}.{}", req.module_name, symbol.name)),
            };
            tx.execute(
                "INSERT INTO symbols
                     (file_id, parent_id, kind, name, fqn, start_line, end_line, sig, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    file_id,
                    parent_id,
                    symbol.kind.as_str(),
                    symbol.name,
                    fqn,
                    symbol.start_line,
                    symbol.end_line,
                    symbol.signature,
                    symbol.docstring,
                ],
            )?;
            let symbol_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO ident_fts (token, symbol_id) VALUES (?1, ?2)",
                params![symbol.name, symbol_id],
            )?;
            by_name.entry(symbol.name.as_str()).or_insert(symbol_id);
            symbol_ids.push(symbol_id);
            fqns.push(fqn);
        }

        // Intra-file call graph: unresolved names are silently dropped
        let mut call_edges = 0;
        for (idx, symbol) in req.symbols.iter().enumerate() {
            for target in &symbol.calls {
                if let Some(&dst) = by_name.get(target.as_str()) {
                    tx.execute(
                        "INSERT INTO edges (src, etype, dst) VALUES (?1, 'CALLS', ?2)",
                        params![symbol_ids[idx], dst],
                    )?;
                    call_edges += 1;
                }
            }
        }

        tx.commit()?;
        Ok(FileIndexOutcome {
            file_id,
            symbol_ids,
            fqns,
            call_edges,
        })
    }

    /// Resolve a file's imported module names and insert IMPORTS edges.
    ///
    /// Runs after every file of a pass has been written, so resolution
    /// sees the complete file table regardless of visit order. Unmatched
    /// imports are dropped: no edge, no error.
    pub fn link_imports(
        &self,
        repo_id: Option<i64>,
        file_id: i64,
        modules: &[String],
    ) -> Result<usize> {
        let mut inserted = 0;
        for module in modules {
            if let Some(dst) = resolve_module(&self.conn, repo_id, module)? {
                if dst != file_id {
                    self.conn.execute(
                        "INSERT INTO edges (src, etype, dst) VALUES (?1, 'IMPORTS', ?2)",
                        params![file_id, dst],
                    )?;
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    // ========== Symbol Operations ==========

    pub fn symbols_in_file(&self, file_id: i64) -> Result<Vec<SymbolRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.file_id, s.parent_id, s.kind, s.name, s.fqn,
                    s.start_line, s.end_line, s.sig, s.doc, f.path
             FROM symbols s JOIN files f ON s.file_id = f.id
             WHERE s.file_id = ?1 ORDER BY s.start_line",
        )?;
        let symbols = stmt
            .query_map([file_id], row_to_symbol)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(symbols)
    }

    /// First symbol with this name, optionally repo-scoped.
    pub fn symbol_by_name(&self, repo_id: Option<i64>, name: &str) -> Result<Option<SymbolRecord>> {
        self.conn
            .query_row(
                "SELECT s.id, s.file_id, s.parent_id, s.kind, s.name, s.fqn,
                        s.start_line, s.end_line, s.sig, s.doc, f.path
                 FROM symbols s JOIN files f ON s.file_id = f.id
                 WHERE s.name = ?1 AND (?2 IS NULL OR f.repo_id IS ?2)
                 ORDER BY s.id LIMIT 1",
                params![name, repo_id],
                row_to_symbol,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn symbol_by_id(&self, id: i64) -> Result<Option<SymbolRecord>> {
        self.conn
            .query_row(
                "SELECT s.id, s.file_id, s.parent_id, s.kind, s.name, s.fqn,
                        s.start_line, s.end_line, s.sig, s.doc, f.path
                 FROM symbols s JOIN files f ON s.file_id = f.id
                 WHERE s.id = ?1",
                [id],
                row_to_symbol,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn count_symbols(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?)
    }

    // ========== Edge Operations ==========

    pub fn insert_edge(&self, src: i64, etype: EdgeType, dst: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO edges (src, etype, dst) VALUES (?1, ?2, ?3)",
            params![src, etype.as_str(), dst],
        )?;
        Ok(())
    }

    /// Ids reachable over one edge hop. `forward` follows src -> dst.
    pub fn edge_neighbors(&self, id: i64, etype: EdgeType, forward: bool) -> Result<Vec<i64>> {
        let sql = if forward {
            "SELECT dst FROM edges WHERE src = ?1 AND etype = ?2"
        } else {
            "SELECT src FROM edges WHERE dst = ?1 AND etype = ?2"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![id, etype.as_str()], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    pub fn count_edges(&self, etype: Option<EdgeType>) -> Result<i64> {
        match etype {
            Some(e) => Ok(self.conn.query_row(
                "SELECT COUNT(*) FROM edges WHERE etype = ?1",
                [e.as_str()],
                |row| row.get(0),
            )?),
            None => Ok(self
                .conn
                .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?),
        }
    }

    // ========== Blob Operations ==========

    /// Replace the documentation blob for a path: old rows (and their
    /// text index entries, embeddings, and DOCS edges) are deleted, never
    /// updated in place.
    pub fn replace_blob(
        &mut self,
        kind: &str,
        text: &str,
        lang: Option<&str>,
        path: &str,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let old_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM blob WHERE path = ?1")?;
            let ids = stmt
                .query_map([path], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            ids
        };
        for old in &old_ids {
            tx.execute("DELETE FROM doc_fts WHERE blob_id = ?1", [old])?;
            tx.execute("DELETE FROM emb WHERE blob_id = ?1", [old])?;
            tx.execute(
                "DELETE FROM edges WHERE etype = 'DOCS' AND src = ?1",
                [old],
            )?;
            tx.execute("DELETE FROM blob WHERE id = ?1", [old])?;
        }
        tx.execute(
            "INSERT INTO blob (kind, text, lang, path) VALUES (?1, ?2, ?3, ?4)",
            params![kind, text, lang, path],
        )?;
        let blob_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO doc_fts (text, blob_id) VALUES (?1, ?2)",
            params![text, blob_id],
        )?;
        tx.commit()?;
        Ok(blob_id)
    }

    pub fn count_blobs(&self, kind: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM blob WHERE kind = ?1",
            [kind],
            |row| row.get(0),
        )?)
    }

    // ========== Embedding Operations ==========

    pub fn insert_embedding(&self, emb: &NewEmbedding) -> Result<i64> {
        let bytes = crate::embed::vector_to_bytes(emb.vector);
        self.conn.execute(
            "INSERT INTO emb (blob_id, symbol_id, dim, vec, index_kind,
                              repo_id, file_id, fqn, start_line, end_line)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                emb.blob_id,
                emb.symbol_id,
                emb.vector.len() as i64,
                bytes,
                emb.index_kind,
                emb.repo_id,
                emb.file_id,
                emb.fqn,
                emb.start_line,
                emb.end_line,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All stored vectors of one index kind, optionally repo-filtered.
    /// Insertion order, so similarity ranking ties stay stable.
    pub fn embeddings(&self, index_kind: &str, repo_id: Option<i64>) -> Result<Vec<StoredEmbedding>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.symbol_id, e.blob_id, e.vec, e.fqn,
                    COALESCE(f.path, b.path), e.start_line, e.end_line
             FROM emb e
             LEFT JOIN files f ON e.file_id = f.id
             LEFT JOIN blob b ON e.blob_id = b.id
             WHERE e.index_kind = ?1 AND (?2 IS NULL OR e.repo_id IS ?2)
             ORDER BY e.id",
        )?;
        let rows = stmt.query_map(params![index_kind, repo_id], |row| {
            let bytes: Vec<u8> = row.get(3)?;
            Ok(StoredEmbedding {
                id: row.get(0)?,
                symbol_id: row.get(1)?,
                blob_id: row.get(2)?,
                vector: crate::embed::bytes_to_vector(&bytes),
                fqn: row.get(4)?,
                path: row.get(5)?,
                start_line: row.get(6)?,
                end_line: row.get(7)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn embedding_for_symbol(&self, symbol_id: i64) -> Result<Option<Vec<f32>>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT vec FROM emb WHERE symbol_id = ?1",
                [symbol_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.map(|b| crate::embed::bytes_to_vector(&b)))
    }

    pub fn count_embeddings(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM emb", [], |row| row.get(0))?)
    }

    // ========== Version / Change Event Operations ==========

    /// Existence is checked by query, not by a unique constraint, so
    /// repeated ingestion runs stay idempotent.
    pub fn version_exists(&self, repo_id: i64, commit_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM version WHERE repo_id = ?1 AND commit_id = ?2",
                params![repo_id, commit_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_version(
        &self,
        repo_id: i64,
        commit_id: &str,
        timestamp: i64,
        author: &str,
        message: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO version (repo_id, commit_id, ts, author, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![repo_id, commit_id, timestamp, author, message],
        )?;
        Ok(())
    }

    pub fn change_event_exists(&self, repo_id: i64, commit_id: &str, path: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM change_event
                 WHERE repo_id = ?1 AND commit_id = ?2 AND path = ?3",
                params![repo_id, commit_id, path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_change_event(&self, repo_id: i64, event: &NewChangeEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO change_event
                 (repo_id, commit_id, parent_commit_id, path, kind, hunk, summary, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                repo_id,
                event.commit_id,
                event.parent_commit_id,
                event.path,
                event.kind,
                event.diff_text,
                event.summary,
                event.timestamp,
            ],
        )?;
        Ok(())
    }

    pub fn recent_changes(&self, repo_id: i64, limit: usize) -> Result<Vec<ChangeEventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, commit_id, parent_commit_id, path, kind, hunk, summary, ts
             FROM change_event WHERE repo_id = ?1
             ORDER BY ts DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![repo_id, limit as i64], |row| {
                Ok(ChangeEventRecord {
                    id: row.get(0)?,
                    commit_id: row.get(1)?,
                    parent_commit_id: row.get(2)?,
                    path: row.get(3)?,
                    kind: row.get(4)?,
                    diff_text: row.get(5)?,
                    summary: row.get(6)?,
                    timestamp: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn count_versions(&self, repo_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM version WHERE repo_id = ?1",
            [repo_id],
            |row| row.get(0),
        )?)
    }

    pub fn count_change_events(&self, repo_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM change_event WHERE repo_id = ?1",
            [repo_id],
            |row| row.get(0),
        )?)
    }

    // ========== Config Tree Operations ==========

    pub fn config_file_by_path(
        &self,
        repo_id: Option<i64>,
        path: &str,
    ) -> Result<Option<ConfigFileRecord>> {
        self.conn
            .query_row(
                "SELECT id, repo_id, file_id, path, format, hash
                 FROM config_files WHERE repo_id IS ?1 AND path = ?2",
                params![repo_id, path],
                row_to_config_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Rebuild a configuration tree wholesale: the old subtree is deleted
    /// and the fresh arena inserted parents-first.
    pub fn replace_config_tree(
        &mut self,
        repo_id: Option<i64>,
        file_id: Option<i64>,
        path: &str,
        format: &str,
        raw_content: &str,
        hash: &str,
        nodes: &[ConfigNodeRec],
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM config_files WHERE repo_id IS ?1 AND path = ?2",
                params![repo_id, path],
                |row| row.get(0),
            )
            .optional()?;
        let config_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE config_files SET format = ?1, raw_content = ?2, hash = ?3
                     WHERE id = ?4",
                    params![format, raw_content, hash, id],
                )?;
                tx.execute("DELETE FROM config_nodes WHERE config_id = ?1", [id])?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO config_files (repo_id, file_id, path, format, raw_content, hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![repo_id, file_id, path, format, raw_content, hash],
                )?;
                tx.last_insert_rowid()
            }
        };

        let mut node_ids: Vec<i64> = Vec::with_capacity(nodes.len());
        for node in nodes {
            let parent_id = node.parent.map(|p| node_ids[p]);
            tx.execute(
                "INSERT INTO config_nodes
                     (config_id, parent_id, key, key_path, value, value_type, line_number)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    config_id,
                    parent_id,
                    node.key,
                    node.key_path,
                    node.value,
                    node.value_type.as_str(),
                    node.line_number,
                ],
            )?;
            node_ids.push(tx.last_insert_rowid());
        }

        tx.commit()?;
        Ok(config_id)
    }

    pub fn config_nodes(&self, config_id: i64) -> Result<Vec<ConfigNodeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, config_id, parent_id, key, key_path, value, value_type, line_number
             FROM config_nodes WHERE config_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([config_id], |row| {
                Ok(ConfigNodeRecord {
                    id: row.get(0)?,
                    config_id: row.get(1)?,
                    parent_id: row.get(2)?,
                    key: row.get(3)?,
                    key_path: row.get(4)?,
                    value: row.get(5)?,
                    value_type: row.get(6)?,
                    line_number: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ========== Full-Text Search ==========

    /// Token search over symbol identifiers, joined back to files and
    /// repositories. Grouping by repository happens at the query layer.
    pub fn search_identifiers(&self, query: &str, limit: usize) -> Result<Vec<IdentifierHit>> {
        let match_expr = fts_prefix_query(query);
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.fqn, s.kind, f.path, s.start_line, s.end_line, r.name
             FROM ident_fts
             JOIN symbols s ON ident_fts.symbol_id = s.id
             JOIN files f ON s.file_id = f.id
             LEFT JOIN repo r ON f.repo_id = r.id
             WHERE ident_fts MATCH ?1
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                Ok(IdentifierHit {
                    symbol_id: row.get(0)?,
                    name: row.get(1)?,
                    fqn: row.get(2)?,
                    kind: row.get(3)?,
                    path: row.get(4)?,
                    start_line: row.get(5)?,
                    end_line: row.get(6)?,
                    repo: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Token search over documentation text.
    pub fn search_docs(&self, query: &str, limit: usize) -> Result<Vec<(i64, String, Option<String>)>> {
        let match_expr = fts_prefix_query(query);
        let mut stmt = self.conn.prepare(
            "SELECT b.id, substr(b.text, 1, 200), b.path
             FROM doc_fts JOIN blob b ON doc_fts.blob_id = b.id
             WHERE doc_fts MATCH ?1 LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

/// Quote the user query and allow prefix matches: `"tok"*`.
fn fts_prefix_query(query: &str) -> String {
    format!("\"{}\"*", query.replace('"', ""))
}

/// Imported module resolution: module name first, then path suffix.
fn resolve_module(
    conn: &Connection,
    repo_id: Option<i64>,
    module: &str,
) -> Result<Option<i64>> {
    let tail = module.rsplit('.').next().unwrap_or(module);
    let by_modname: Option<i64> = conn
        .query_row(
            "SELECT id FROM files WHERE repo_id IS ?1 AND modname = ?2 LIMIT 1",
            params![repo_id, tail],
            |row| row.get(0),
        )
        .optional()?;
    if by_modname.is_some() {
        return Ok(by_modname);
    }
    let pattern = format!("%{}.%", module.replace('.', "/"));
    conn.query_row(
        "SELECT id FROM files WHERE repo_id IS ?1 AND path LIKE ?2 LIMIT 1",
        params![repo_id, pattern],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn row_to_repo(row: &rusqlite::Row) -> rusqlite::Result<RepoRecord> {
    Ok(RepoRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        root_path: row.get(2)?,
        default_branch: row.get(3)?,
        last_indexed_at: row.get(4)?,
        last_commit: row.get(5)?,
    })
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        path: row.get(2)?,
        lang: row.get(3)?,
        hash: row.get(4)?,
        modname: row.get(5)?,
    })
}

fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<SymbolRecord> {
    Ok(SymbolRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        parent_id: row.get(2)?,
        kind: row.get(3)?,
        name: row.get(4)?,
        fqn: row.get(5)?,
        start_line: row.get(6)?,
        end_line: row.get(7)?,
        signature: row.get(8)?,
        docstring: row.get(9)?,
        path: row.get(10)?,
    })
}

fn row_to_config_file(row: &rusqlite::Row) -> rusqlite::Result<ConfigFileRecord> {
    Ok(ConfigFileRecord {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        file_id: row.get(2)?,
        path: row.get(3)?,
        format: row.get(4)?,
        hash: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ParsedSymbol, SymbolKind};

    fn sample_request(symbols: &[ParsedSymbol]) -> FileIndexRequest<'_> {
        FileIndexRequest {
            repo_id: None,
            path: "src/example.py",
            language: Some("python"),
            hash: "abc123",
            module_name: "example",
            symbols,
        }
    }

    #[test]
    fn test_register_repo_rejects_duplicate() {
        let store = GraphStore::open_in_memory().unwrap();
        store.register_repo("app", "/tmp/app", Some("main")).unwrap();
        let err = store.register_repo("app", "/tmp/other", None).unwrap_err();
        assert!(matches!(err, Error::RepositoryExists(_)));
        assert_eq!(store.list_repos().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_file_index_roundtrip() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let symbols = vec![
            ParsedSymbol::new(SymbolKind::Function, "alpha", 1, 2),
            ParsedSymbol::new(SymbolKind::Class, "Beta", 4, 8),
        ];
        let outcome = store.apply_file_index(&sample_request(&symbols)).unwrap();
        assert_eq!(outcome.symbol_ids.len(), 2);

        let stored = store.symbols_in_file(outcome.file_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].fqn, "example.alpha");
        assert_eq!(stored[1].fqn, "example.Beta");
    }

    #[test]
    fn test_reindex_replaces_rows() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let symbols = vec![ParsedSymbol::new(SymbolKind::Function, "alpha", 1, 2)];
        let first = store.apply_file_index(&sample_request(&symbols)).unwrap();
        let second = store.apply_file_index(&sample_request(&symbols)).unwrap();

        assert_eq!(first.file_id, second.file_id);
        assert_ne!(first.symbol_ids, second.symbol_ids);
        assert_eq!(store.count_symbols().unwrap(), 1);
    }

    #[test]
    fn test_call_edges_resolve_within_file() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let mut caller = ParsedSymbol::new(SymbolKind::Function, "caller", 1, 3);
        caller.calls = vec!["callee".into(), "unknown_elsewhere".into()];
        let symbols = vec![
            caller,
            ParsedSymbol::new(SymbolKind::Function, "callee", 5, 6),
        ];
        let outcome = store.apply_file_index(&sample_request(&symbols)).unwrap();
        assert_eq!(outcome.call_edges, 1);
        let neighbors = store
            .edge_neighbors(outcome.symbol_ids[0], EdgeType::Calls, true)
            .unwrap();
        assert_eq!(neighbors, vec![outcome.symbol_ids[1]]);
    }

    #[test]
    fn test_import_edges_resolve_by_module_name() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let helpers = vec![ParsedSymbol::new(SymbolKind::Function, "helper", 1, 2)];
        let helper_req = FileIndexRequest {
            path: "src/util.py",
            module_name: "util",
            ..sample_request(&helpers)
        };
        let helper_outcome = store.apply_file_index(&helper_req).unwrap();

        let importer = vec![ParsedSymbol::new(SymbolKind::Function, "main", 1, 2)];
        let outcome = store
            .apply_file_index(&sample_request(&importer))
            .unwrap();
        let imports = vec!["util".to_string()];
        let inserted = store.link_imports(None, outcome.file_id, &imports).unwrap();
        assert_eq!(inserted, 1);
        let deps = store
            .edge_neighbors(outcome.file_id, EdgeType::Imports, true)
            .unwrap();
        assert_eq!(deps, vec![helper_outcome.file_id]);
    }

    #[test]
    fn test_nested_parent_ids() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let symbols = vec![
            ParsedSymbol::new(SymbolKind::Class, "Beta", 1, 5),
            ParsedSymbol::new(SymbolKind::Method, "method", 2, 3).with_parent(0),
        ];
        let outcome = store.apply_file_index(&sample_request(&symbols)).unwrap();
        let stored = store.symbols_in_file(outcome.file_id).unwrap();
        let method = stored.iter().find(|s| s.name == "method").unwrap();
        assert_eq!(method.parent_id, Some(outcome.symbol_ids[0]));
        assert_eq!(method.fqn, "example.Beta.method");
    }

    #[test]
    fn test_identifier_search() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let symbols = vec![ParsedSymbol::new(
            SymbolKind::Function,
            "validate_token",
            1,
            2,
        )];
        store.apply_file_index(&sample_request(&symbols)).unwrap();

        let hits = store.search_identifiers("validate_token", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "validate_token");
    }

    #[test]
    fn test_version_existence_check() {
        let store = GraphStore::open_in_memory().unwrap();
        let repo_id = store.register_repo("app", "/tmp/app", None).unwrap();
        assert!(!store.version_exists(repo_id, "deadbeef").unwrap());
        store
            .insert_version(repo_id, "deadbeef", 1700000000, "dev", "initial")
            .unwrap();
        assert!(store.version_exists(repo_id, "deadbeef").unwrap());
    }

    #[test]
    fn test_blob_replace_not_update() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let first = store
            .replace_blob("doc", "old text", Some("md"), "docs/guide.md")
            .unwrap();
        let second = store
            .replace_blob("doc", "new text", Some("md"), "docs/guide.md")
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(store.count_blobs("doc").unwrap(), 1);
    }

    #[test]
    fn test_embedding_roundtrip() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let symbols = vec![ParsedSymbol::new(SymbolKind::Function, "alpha", 1, 2)];
        let outcome = store.apply_file_index(&sample_request(&symbols)).unwrap();

        store
            .insert_embedding(&NewEmbedding {
                blob_id: None,
                symbol_id: Some(outcome.symbol_ids[0]),
                vector: &[0.1, 0.2, 0.3],
                index_kind: "code",
                repo_id: None,
                file_id: Some(outcome.file_id),
                fqn: Some("example.alpha"),
                start_line: Some(1),
                end_line: Some(2),
            })
            .unwrap();

        let stored = store.embeddings("code", None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].vector.len(), 3);
        assert!((stored[0].vector[1] - 0.2).abs() < 1e-6);
    }
}
