//! Database schema definitions.
//!
//! Integer row ids everywhere; trees (symbols, config nodes) reference
//! their parents by id, and parents are always inserted first.

/// SQL to create the repo table
pub const CREATE_REPO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS repo (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    root_path TEXT NOT NULL,
    default_branch TEXT,
    last_indexed_at INTEGER,
    last_commit TEXT
)
"#;

/// SQL to create the files table
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER REFERENCES repo(id),
    path TEXT NOT NULL,
    lang TEXT,
    hash TEXT NOT NULL,
    modname TEXT,
    UNIQUE(repo_id, path)
)
"#;

/// SQL to create the symbols table
pub const CREATE_SYMBOLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id),
    parent_id INTEGER REFERENCES symbols(id),
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    fqn TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    sig TEXT,
    doc TEXT
)
"#;

/// SQL to create the edges table.
/// CALLS: symbol -> symbol, IMPORTS: file -> file, DOCS: blob -> file.
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    src INTEGER NOT NULL,
    etype TEXT NOT NULL,
    dst INTEGER NOT NULL
)
"#;

/// SQL to create the blob table (documentation text)
pub const CREATE_BLOB_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS blob (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    text TEXT NOT NULL,
    lang TEXT,
    path TEXT
)
"#;

/// SQL to create the embeddings table
pub const CREATE_EMB_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS emb (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blob_id INTEGER REFERENCES blob(id),
    symbol_id INTEGER REFERENCES symbols(id),
    dim INTEGER NOT NULL,
    vec BLOB NOT NULL,
    index_kind TEXT NOT NULL,
    repo_id INTEGER,
    file_id INTEGER,
    fqn TEXT,
    start_line INTEGER,
    end_line INTEGER
)
"#;

/// SQL to create the commit metadata table.
/// Uniqueness of (repo_id, commit_id) is enforced by the ingestor's own
/// existence check, not a constraint.
pub const CREATE_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS version (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    commit_id TEXT NOT NULL,
    ts INTEGER,
    author TEXT,
    message TEXT
)
"#;

/// SQL to create the change_event table
pub const CREATE_CHANGE_EVENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS change_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    commit_id TEXT NOT NULL,
    parent_commit_id TEXT,
    path TEXT NOT NULL,
    kind TEXT NOT NULL,
    hunk TEXT,
    summary TEXT,
    ts INTEGER
)
"#;

/// SQL to create the config_files table
pub const CREATE_CONFIG_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS config_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER,
    file_id INTEGER,
    path TEXT NOT NULL,
    format TEXT NOT NULL,
    raw_content TEXT,
    hash TEXT NOT NULL,
    UNIQUE(repo_id, path)
)
"#;

/// SQL to create the config_nodes table
pub const CREATE_CONFIG_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS config_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    config_id INTEGER NOT NULL REFERENCES config_files(id),
    parent_id INTEGER REFERENCES config_nodes(id),
    key TEXT NOT NULL,
    key_path TEXT NOT NULL,
    value TEXT,
    value_type TEXT NOT NULL,
    line_number INTEGER
)
"#;

/// Full-text index over identifier tokens, keyed by symbol id
pub const CREATE_IDENT_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS ident_fts USING fts5(
    token,
    symbol_id UNINDEXED
)
"#;

/// Full-text index over documentation blob text, keyed by blob id
pub const CREATE_DOC_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS doc_fts USING fts5(
    text,
    blob_id UNINDEXED
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_files_repo_path ON files(repo_id, path)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name)",
    "CREATE INDEX IF NOT EXISTS idx_edges_src ON edges(src, etype)",
    "CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges(dst, etype)",
    "CREATE INDEX IF NOT EXISTS idx_version_repo_commit ON version(repo_id, commit_id)",
    "CREATE INDEX IF NOT EXISTS idx_change_event_repo ON change_event(repo_id, commit_id, path)",
    "CREATE INDEX IF NOT EXISTS idx_emb_kind ON emb(index_kind, repo_id)",
    "CREATE INDEX IF NOT EXISTS idx_config_nodes_config ON config_nodes(config_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_REPO_TABLE,
        CREATE_FILES_TABLE,
        CREATE_SYMBOLS_TABLE,
        CREATE_EDGES_TABLE,
        CREATE_BLOB_TABLE,
        CREATE_EMB_TABLE,
        CREATE_VERSION_TABLE,
        CREATE_CHANGE_EVENT_TABLE,
        CREATE_CONFIG_FILES_TABLE,
        CREATE_CONFIG_NODES_TABLE,
        CREATE_IDENT_FTS,
        CREATE_DOC_FTS,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
