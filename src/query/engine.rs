//! Query engine implementation
//!
//! Provides high-level read-side operations:
//! - Symbol hierarchy reconstruction for a file
//! - Call graph traversal (forward/backward BFS with depth bound)
//! - Import dependency traversal
//! - Cross-repository identifier search
//!
//! A missing root symbol or file is an explicit `NotFound` error, never
//! an empty graph - callers can tell "no such symbol" apart from
//! "symbol exists but has no edges".

use crate::store::{EdgeType, GraphStore, IdentifierHit, SymbolRecord};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::str::FromStr;

/// Default depth bound for call graph traversal
pub const DEFAULT_CALL_DEPTH: usize = 3;
/// Default depth bound for dependency traversal
pub const DEFAULT_DEPENDENCY_DEPTH: usize = 1;

/// Traversal direction over CALLS edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// What the symbol calls
    Forward,
    /// What calls the symbol
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown direction: {}",
                s
            ))),
        }
    }
}

/// One node of a reconstructed symbol hierarchy
#[derive(Debug, Serialize)]
pub struct SymbolTreeNode {
    #[serde(flatten)]
    pub symbol: SymbolRecord,
    pub children: Vec<SymbolTreeNode>,
}

/// Graph node rendered in call/dependency results
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: i64,
    pub name: String,
    pub fqn: String,
    pub kind: String,
    pub path: String,
}

impl From<&SymbolRecord> for GraphNode {
    fn from(s: &SymbolRecord) -> Self {
        GraphNode {
            id: s.id,
            name: s.name.clone(),
            fqn: s.fqn.clone(),
            kind: s.kind.clone(),
            path: s.path.clone(),
        }
    }
}

/// One traversed edge
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub from: i64,
    pub to: i64,
    pub edge_type: String,
}

/// Result of a call graph traversal: the node set reached and the edges
/// actually traversed, not the full edge table.
#[derive(Debug, Serialize)]
pub struct CallGraph {
    pub root: GraphNode,
    pub direction: Direction,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// One file in a dependency traversal
#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    pub id: i64,
    pub path: String,
    pub lang: Option<String>,
}

/// Result of an import dependency traversal
#[derive(Debug, Serialize)]
pub struct DependencyGraph {
    pub root_file: String,
    pub depth: usize,
    pub nodes: Vec<FileNode>,
    pub edges: Vec<GraphEdge>,
}

/// Query engine over the persistent store
pub struct QueryEngine<'a> {
    store: &'a GraphStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Reconstruct the parent/child nesting of a file's symbols.
    ///
    /// Two passes: build one node per row, then attach each node to its
    /// parent's children list; parentless nodes become roots.
    pub fn symbol_tree(
        &self,
        repo_id: Option<i64>,
        file_path: &str,
    ) -> Result<Vec<SymbolTreeNode>> {
        let file = self
            .store
            .file_by_path_suffix(repo_id, file_path)?
            .ok_or_else(|| Error::NotFound(format!("file '{}' not found", file_path)))?;
        let rows = self.store.symbols_in_file(file.id)?;

        let index_of: HashMap<i64, usize> =
            rows.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
        let mut roots: Vec<usize> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            match row.parent_id.and_then(|p| index_of.get(&p)) {
                Some(&parent_idx) => children[parent_idx].push(i),
                None => roots.push(i),
            }
        }

        fn build(idx: usize, rows: &[SymbolRecord], children: &[Vec<usize>]) -> SymbolTreeNode {
            SymbolTreeNode {
                symbol: rows[idx].clone(),
                children: children[idx]
                    .iter()
                    .map(|&c| build(c, rows, children))
                    .collect(),
            }
        }

        Ok(roots.into_iter().map(|r| build(r, &rows, &children)).collect())
    }

    /// BFS over CALLS edges from a named symbol, bounded by depth with a
    /// visited-set guard against cyclic call graphs.
    pub fn call_graph(
        &self,
        repo_id: Option<i64>,
        symbol_name: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<CallGraph> {
        let root = self
            .store
            .symbol_by_name(repo_id, symbol_name)?
            .ok_or_else(|| Error::NotFound(format!("symbol '{}' not found", symbol_name)))?;

        let root_node = GraphNode::from(&root);
        let mut nodes: Vec<GraphNode> = vec![root_node.clone()];
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut seen_edges: HashSet<(i64, i64)> = HashSet::new();
        let mut visited: HashSet<i64> = HashSet::new();
        let mut queue: VecDeque<(i64, usize)> = VecDeque::new();

        visited.insert(root.id);
        queue.push_back((root.id, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let forward = direction == Direction::Forward;
            for neighbor in self.store.edge_neighbors(current, EdgeType::Calls, forward)? {
                let (from, to) = if forward {
                    (current, neighbor)
                } else {
                    (neighbor, current)
                };
                if seen_edges.insert((from, to)) {
                    edges.push(GraphEdge {
                        from,
                        to,
                        edge_type: EdgeType::Calls.as_str().to_string(),
                    });
                }
                if visited.insert(neighbor) {
                    if let Some(symbol) = self.store.symbol_by_id(neighbor)? {
                        nodes.push(GraphNode::from(&symbol));
                    }
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        Ok(CallGraph {
            root: root_node,
            direction,
            nodes,
            edges,
        })
    }

    /// BFS over IMPORTS edges from a file.
    pub fn dependency_graph(
        &self,
        repo_id: Option<i64>,
        file_path: &str,
        max_depth: usize,
    ) -> Result<DependencyGraph> {
        let root = self
            .store
            .file_by_path_suffix(repo_id, file_path)?
            .ok_or_else(|| Error::NotFound(format!("file '{}' not found", file_path)))?;

        let mut nodes: Vec<FileNode> = vec![FileNode {
            id: root.id,
            path: root.path.clone(),
            lang: root.lang.clone(),
        }];
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut seen_edges: HashSet<(i64, i64)> = HashSet::new();
        let mut visited: HashSet<i64> = HashSet::new();
        let mut queue: VecDeque<(i64, usize)> = VecDeque::new();

        visited.insert(root.id);
        queue.push_back((root.id, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for imported in self
                .store
                .edge_neighbors(current, EdgeType::Imports, true)?
            {
                if seen_edges.insert((current, imported)) {
                    edges.push(GraphEdge {
                        from: current,
                        to: imported,
                        edge_type: EdgeType::Imports.as_str().to_string(),
                    });
                }
                if visited.insert(imported) {
                    if let Some(file) = self.store.file_by_id(imported)? {
                        nodes.push(FileNode {
                            id: file.id,
                            path: file.path,
                            lang: file.lang,
                        });
                    }
                    queue.push_back((imported, depth + 1));
                }
            }
        }

        Ok(DependencyGraph {
            root_file: root.path,
            depth: max_depth,
            nodes,
            edges,
        })
    }

    /// Identifier token search across every repository, grouped by the
    /// owning repository in the response.
    pub fn search_repositories(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<BTreeMap<String, Vec<IdentifierHit>>> {
        let hits = self.store.search_identifiers(query, limit)?;
        let mut grouped: BTreeMap<String, Vec<IdentifierHit>> = BTreeMap::new();
        for hit in hits {
            let key = hit
                .repo
                .clone()
                .unwrap_or_else(|| "(unregistered)".to_string());
            grouped.entry(key).or_default().push(hit);
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileIndexRequest;
    use crate::symbol::{ParsedSymbol, SymbolKind};

    fn store_with_file(symbols: Vec<ParsedSymbol>) -> GraphStore {
        let mut store = GraphStore::open_in_memory().unwrap();
        store
            .apply_file_index(&FileIndexRequest {
                repo_id: None,
                path: "src/example.py",
                language: Some("python"),
                hash: "h1",
                module_name: "example",
                symbols: &symbols,
            })
            .unwrap();
        store
    }

    fn calls(name: &str, targets: &[&str], line: u32) -> ParsedSymbol {
        let mut s = ParsedSymbol::new(SymbolKind::Function, name, line, line + 2);
        s.calls = targets.iter().map(|t| t.to_string()).collect();
        s
    }

    #[test]
    fn test_symbol_tree_nesting() {
        let symbols = vec![
            ParsedSymbol::new(SymbolKind::Class, "Outer", 1, 10),
            ParsedSymbol::new(SymbolKind::Method, "inner", 2, 4).with_parent(0),
            ParsedSymbol::new(SymbolKind::Function, "standalone", 12, 14),
        ];
        let store = store_with_file(symbols);
        let engine = QueryEngine::new(&store);

        let tree = engine.symbol_tree(None, "src/example.py").unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].symbol.name, "Outer");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].symbol.name, "inner");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_symbol_tree_file_not_found() {
        let store = GraphStore::open_in_memory().unwrap();
        let engine = QueryEngine::new(&store);
        let err = engine.symbol_tree(None, "missing.py").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_call_graph_forward() {
        let symbols = vec![
            calls("a", &["b"], 1),
            calls("b", &["c"], 5),
            calls("c", &[], 9),
        ];
        let store = store_with_file(symbols);
        let engine = QueryEngine::new(&store);

        let graph = engine
            .call_graph(None, "a", Direction::Forward, DEFAULT_CALL_DEPTH)
            .unwrap();
        let names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_call_graph_backward() {
        let symbols = vec![calls("a", &["b"], 1), calls("b", &[], 5)];
        let store = store_with_file(symbols);
        let engine = QueryEngine::new(&store);

        let graph = engine
            .call_graph(None, "b", Direction::Backward, 2)
            .unwrap();
        let names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(graph.edges[0].from, graph.nodes[1].id);
        assert_eq!(graph.edges[0].to, graph.nodes[0].id);
    }

    #[test]
    fn test_call_graph_cycle_terminates() {
        // a -> b -> a: must terminate and return exactly {a, b}
        let symbols = vec![calls("a", &["b"], 1), calls("b", &["a"], 5)];
        let store = store_with_file(symbols);
        let engine = QueryEngine::new(&store);

        let graph = engine
            .call_graph(None, "a", Direction::Forward, 5)
            .unwrap();
        let mut names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_call_graph_depth_bound() {
        let symbols = vec![
            calls("a", &["b"], 1),
            calls("b", &["c"], 5),
            calls("c", &[], 9),
        ];
        let store = store_with_file(symbols);
        let engine = QueryEngine::new(&store);

        let graph = engine
            .call_graph(None, "a", Direction::Forward, 1)
            .unwrap();
        let names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_call_graph_symbol_not_found() {
        let store = GraphStore::open_in_memory().unwrap();
        let engine = QueryEngine::new(&store);
        let err = engine
            .call_graph(None, "ghost", Direction::Forward, 3)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_call_graph_no_edges_is_not_an_error() {
        let store = store_with_file(vec![calls("loner", &[], 1)]);
        let engine = QueryEngine::new(&store);
        let graph = engine
            .call_graph(None, "loner", Direction::Forward, 3)
            .unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_dependency_graph_depth_one() {
        let mut store = GraphStore::open_in_memory().unwrap();
        let util = vec![ParsedSymbol::new(SymbolKind::Function, "helper", 1, 2)];
        store
            .apply_file_index(&FileIndexRequest {
                repo_id: None,
                path: "src/util.py",
                language: Some("python"),
                hash: "h1",
                module_name: "util",
                symbols: &util,
            })
            .unwrap();
        let main_symbols = vec![ParsedSymbol::new(SymbolKind::Function, "run", 1, 2)];
        let outcome = store
            .apply_file_index(&FileIndexRequest {
                repo_id: None,
                path: "src/main.py",
                language: Some("python"),
                hash: "h2",
                module_name: "main",
                symbols: &main_symbols,
            })
            .unwrap();
        store
            .link_imports(None, outcome.file_id, &["util".to_string()])
            .unwrap();

        let engine = QueryEngine::new(&store);
        let graph = engine
            .dependency_graph(None, "src/main.py", DEFAULT_DEPENDENCY_DEPTH)
            .unwrap();
        assert_eq!(graph.root_file, "src/main.py");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.nodes[1].path, "src/util.py");
    }

    #[test]
    fn test_search_repositories_groups() {
        let store = store_with_file(vec![calls("finder", &[], 1)]);
        let engine = QueryEngine::new(&store);
        let grouped = engine.search_repositories("finder", 10).unwrap();
        assert_eq!(grouped.len(), 1);
        let hits = grouped.get("(unregistered)").unwrap();
        assert_eq!(hits[0].name, "finder");
    }
}
