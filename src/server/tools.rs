//! Tool handlers: one named operation per capability.
//!
//! Lookup misses come back as `{"error": ...}` payloads so callers can
//! tell "no such symbol" apart from a transport failure; everything else
//! propagates as an error.

use crate::embed::EmbeddingProvider;
use crate::query::engine::{DEFAULT_CALL_DEPTH, DEFAULT_DEPENDENCY_DEPTH};
use crate::query::{Direction, QueryEngine};
use crate::store::GraphStore;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};

/// Flat string-keyed argument map
pub type ToolArgs = serde_json::Map<String, Value>;

/// Capabilities a tool handler may touch.
pub struct ToolContext<'a> {
    pub store: &'a mut GraphStore,
    pub provider: Option<&'a dyn EmbeddingProvider>,
}

type ToolHandler = fn(&mut ToolContext, &ToolArgs) -> Result<String>;

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    handler: ToolHandler,
}

/// Registry mapping tool names to handlers.
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// All built-in tools.
    pub fn with_default_tools() -> Self {
        let mut registry = Self { tools: Vec::new() };
        registry.register(
            "search_code",
            "Search code symbols by identifier token",
            search_code,
        );
        registry.register(
            "search_semantic",
            "Semantic similarity search over code or documentation",
            search_semantic,
        );
        registry.register(
            "get_symbol_tree",
            "Hierarchical symbol tree for a file",
            get_symbol_tree,
        );
        registry.register(
            "get_call_graph",
            "Call graph for a symbol (forward or backward)",
            get_call_graph,
        );
        registry.register(
            "get_dependencies",
            "Import dependencies of a file",
            get_dependencies,
        );
        registry.register(
            "list_repositories",
            "List registered repositories",
            list_repositories,
        );
        registry.register(
            "get_repo_stats",
            "Statistics for one repository",
            get_repo_stats,
        );
        registry.register(
            "get_recent_changes",
            "Most recent change events for a repository",
            get_recent_changes,
        );
        registry.register(
            "get_config_tree",
            "Parsed configuration tree for a file",
            get_config_tree,
        );
        registry
    }

    pub fn register(
        &mut self,
        name: &'static str,
        description: &'static str,
        handler: ToolHandler,
    ) {
        self.tools.push(ToolSpec {
            name,
            description,
            handler,
        });
    }

    /// Names and descriptions, for a transport's tool listing.
    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        self.tools
            .iter()
            .map(|t| (t.name, t.description))
            .collect()
    }

    /// Forward a tool call to its handler.
    pub fn dispatch(&self, ctx: &mut ToolContext, name: &str, args: &ToolArgs) -> Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::NotFound(format!("unknown tool '{}'", name)))?;
        (tool.handler)(ctx, args)
    }
}

// --- argument helpers ---

fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn required_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    str_arg(args, key)
        .ok_or_else(|| Error::InvalidArgument(format!("missing argument '{}'", key)))
}

fn usize_arg(args: &ToolArgs, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// Resolve an optional `repo` argument to its id. An unknown repository
/// name is a lookup miss.
fn repo_id_arg(store: &GraphStore, args: &ToolArgs) -> Result<Option<i64>> {
    match str_arg(args, "repo") {
        None => Ok(None),
        Some(name) => match store.repo_by_name(name)? {
            Some(repo) => Ok(Some(repo.id)),
            None => Err(Error::NotFound(format!("repository '{}' not found", name))),
        },
    }
}

/// Serialize a result, turning lookup misses into explicit error payloads.
fn render<T: Serialize>(result: Result<T>) -> Result<String> {
    match result {
        Ok(value) => Ok(serde_json::to_string_pretty(&value)
            .map_err(|e| Error::Parse(format!("serialization failed: {}", e)))?),
        Err(err) if err.is_not_found() => Ok(json!({ "error": err.to_string() }).to_string()),
        Err(err) => Err(err),
    }
}

// --- handlers ---

fn search_code(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let query = required_str(args, "query")?;
    let limit = usize_arg(args, "limit", 10);
    let engine = QueryEngine::new(ctx.store);
    render(engine.search_repositories(query, limit).map(|grouped| {
        let count: usize = grouped.values().map(|v| v.len()).sum();
        json!({
            "count": count,
            "results": grouped,
        })
    }))
}

fn search_semantic(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let query = required_str(args, "query")?;
    let limit = usize_arg(args, "limit", 10);
    let search_type = str_arg(args, "type").unwrap_or("code");
    let repo_id = repo_id_arg(ctx.store, args)?;

    let Some(provider) = ctx.provider else {
        return Ok(json!({ "error": "embedding provider unavailable" }).to_string());
    };
    let hits = match search_type {
        "docs" | "documentation" => {
            crate::embed::search_docs_semantic(ctx.store, provider, query, repo_id, limit)
        }
        _ => crate::embed::search_code_semantic(ctx.store, provider, query, repo_id, limit),
    };
    render(hits.map(|results| json!({ "count": results.len(), "results": results })))
}

fn get_symbol_tree(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let file_path = required_str(args, "file_path")?;
    let repo_id = repo_id_arg(ctx.store, args)?;
    let engine = QueryEngine::new(ctx.store);
    render(engine.symbol_tree(repo_id, file_path))
}

fn get_call_graph(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let symbol_name = required_str(args, "symbol_name")?;
    let repo_id = repo_id_arg(ctx.store, args)?;
    let direction = match str_arg(args, "direction") {
        Some(raw) => raw.parse()?,
        None => Direction::Forward,
    };
    let depth = usize_arg(args, "depth", DEFAULT_CALL_DEPTH);
    let engine = QueryEngine::new(ctx.store);
    render(engine.call_graph(repo_id, symbol_name, direction, depth))
}

fn get_dependencies(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let file_path = required_str(args, "file_path")?;
    let repo_id = repo_id_arg(ctx.store, args)?;
    let depth = usize_arg(args, "depth", DEFAULT_DEPENDENCY_DEPTH);
    let engine = QueryEngine::new(ctx.store);
    render(engine.dependency_graph(repo_id, file_path, depth))
}

fn list_repositories(ctx: &mut ToolContext, _args: &ToolArgs) -> Result<String> {
    render(ctx.store.list_repos().map(|repos| {
        json!({
            "count": repos.len(),
            "repositories": repos,
        })
    }))
}

fn get_repo_stats(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let name = required_str(args, "repo")?;
    let result: Result<Value> = (|| {
        let repo = ctx
            .store
            .repo_by_name(name)?
            .ok_or_else(|| Error::NotFound(format!("repository '{}' not found", name)))?;
        let stats = ctx.store.repo_stats(repo.id)?;
        Ok(json!({ "repository": repo, "stats": stats }))
    })();
    render(result)
}

fn get_recent_changes(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let name = required_str(args, "repo")?;
    let limit = usize_arg(args, "limit", 20);
    let result: Result<Value> = (|| {
        let repo = ctx
            .store
            .repo_by_name(name)?
            .ok_or_else(|| Error::NotFound(format!("repository '{}' not found", name)))?;
        let changes = ctx.store.recent_changes(repo.id, limit)?;
        Ok(json!({ "count": changes.len(), "changes": changes }))
    })();
    render(result)
}

fn get_config_tree(ctx: &mut ToolContext, args: &ToolArgs) -> Result<String> {
    let path = required_str(args, "path")?;
    let repo_id = repo_id_arg(ctx.store, args)?;
    let result: Result<Value> = (|| {
        let config = ctx
            .store
            .config_file_by_path(repo_id, path)?
            .ok_or_else(|| Error::NotFound(format!("config file '{}' not found", path)))?;
        let nodes = ctx.store.config_nodes(config.id)?;
        Ok(json!({ "config": config, "nodes": nodes }))
    })();
    render(result)
}
