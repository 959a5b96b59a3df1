//! Native structural Python extraction (tier 1).
//!
//! Walks the tree-sitter AST and produces the full nested symbol tree:
//! start/end lines (1-indexed, inclusive), signatures as name plus
//! ordered parameter names, leading-string docstrings, per-symbol call
//! targets, and module imports. Parents are always emitted before their
//! children so the arena invariant holds by construction.

use super::SymbolExtractor;
use crate::language::Language;
use crate::symbol::{ExtractedFile, ParsedSymbol, SymbolKind};
use crate::{Error, Result};
use tree_sitter::{Node, Parser};

pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }

    fn parse(&self, source: &str) -> Result<ExtractedFile> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| Error::Parse(format!("failed to load python grammar: {}", e)))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| Error::Parse("python parse returned no tree".to_string()))?;

        let mut out = ExtractedFile::default();
        walk(tree.root_node(), source, None, &mut out);
        Ok(out)
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor for PythonExtractor {
    fn tier(&self) -> &'static str {
        "native"
    }

    fn supports(&self, language: Language) -> bool {
        language == Language::Python
    }

    fn extract(&self, _language: Language, source: &str) -> Result<ExtractedFile> {
        self.parse(source)
    }
}

/// Recursive walk emitting definitions in source order.
///
/// `parent` is the arena index of the enclosing definition, if any.
fn walk(node: Node, source: &str, parent: Option<usize>, out: &mut ExtractedFile) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                extract_function(child, source, parent, out);
            }
            "class_definition" => {
                extract_class(child, source, parent, out);
            }
            "decorated_definition" => {
                if let Some(inner) = child.child_by_field_name("definition") {
                    match inner.kind() {
                        "function_definition" => extract_function(inner, source, parent, out),
                        "class_definition" => extract_class(inner, source, parent, out),
                        _ => {}
                    }
                }
            }
            "import_statement" => {
                extract_import(child, source, out);
            }
            "import_from_statement" => {
                if let Some(module) = child.child_by_field_name("module_name") {
                    if let Ok(name) = module.utf8_text(source.as_bytes()) {
                        out.imports.push(name.to_string());
                    }
                }
            }
            _ => {
                // Definitions can hide inside if/try blocks at any level.
                walk(child, source, parent, out);
            }
        }
    }
}

fn extract_function(node: Node, source: &str, parent: Option<usize>, out: &mut ExtractedFile) {
    let Some(name) = node_name(node, source) else {
        return;
    };

    let is_async = node
        .child(0)
        .map(|c| c.kind() == "async")
        .unwrap_or(false);
    let parent_is_class = parent
        .and_then(|p| out.symbols.get(p))
        .map(|s| s.kind == SymbolKind::Class)
        .unwrap_or(false);
    let kind = if is_async {
        SymbolKind::AsyncFunction
    } else if parent_is_class {
        SymbolKind::Method
    } else {
        SymbolKind::Function
    };

    let mut symbol = ParsedSymbol::new(
        kind,
        &name,
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
    .with_signature(signature(node, source, &name));

    if let Some(doc) = docstring(node, source) {
        symbol = symbol.with_docstring(doc);
    }
    if let Some(p) = parent {
        symbol = symbol.with_parent(p);
    }
    if let Some(body) = node.child_by_field_name("body") {
        collect_calls(body, source, &mut symbol.calls);
    }

    let idx = out.symbols.len();
    out.symbols.push(symbol);

    if let Some(body) = node.child_by_field_name("body") {
        walk(body, source, Some(idx), out);
    }
}

fn extract_class(node: Node, source: &str, parent: Option<usize>, out: &mut ExtractedFile) {
    let Some(name) = node_name(node, source) else {
        return;
    };

    let mut symbol = ParsedSymbol::new(
        SymbolKind::Class,
        &name,
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    );
    if let Some(doc) = docstring(node, source) {
        symbol = symbol.with_docstring(doc);
    }
    if let Some(p) = parent {
        symbol = symbol.with_parent(p);
    }

    let idx = out.symbols.len();
    out.symbols.push(symbol);

    if let Some(body) = node.child_by_field_name("body") {
        walk(body, source, Some(idx), out);
    }
}

/// `import a, b.c` - one entry per dotted name; aliases keep the real
/// module name.
fn extract_import(node: Node, source: &str, out: &mut ExtractedFile) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let module = match child.kind() {
            "dotted_name" => child.utf8_text(source.as_bytes()).ok(),
            "aliased_import" => child
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source.as_bytes()).ok()),
            _ => None,
        };
        if let Some(module) = module {
            out.imports.push(module.to_string());
        }
    }
}

fn node_name(node: Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")?
        .utf8_text(source.as_bytes())
        .ok()
        .map(|s| s.to_string())
}

/// Signature is the name plus the ordered parameter names: `alpha(a, b)`.
fn signature(node: Node, source: &str, name: &str) -> String {
    let mut params = Vec::new();
    if let Some(parameters) = node.child_by_field_name("parameters") {
        let mut cursor = parameters.walk();
        for param in parameters.named_children(&mut cursor) {
            let param_name = match param.kind() {
                "identifier" => param.utf8_text(source.as_bytes()).ok().map(str::to_string),
                "typed_parameter" | "typed_default_parameter" | "default_parameter" => param
                    .named_child(0)
                    .filter(|c| c.kind() == "identifier")
                    .and_then(|c| c.utf8_text(source.as_bytes()).ok())
                    .map(str::to_string),
                "list_splat_pattern" | "dictionary_splat_pattern" => param
                    .named_child(0)
                    .and_then(|c| c.utf8_text(source.as_bytes()).ok())
                    .map(str::to_string),
                _ => None,
            };
            if let Some(p) = param_name {
                params.push(p);
            }
        }
    }
    format!("{}({})", name, params.join(", "))
}

/// Leading string literal of a definition body.
fn docstring(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    let raw = expr.utf8_text(source.as_bytes()).ok()?;
    let trimmed = raw
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Record called names in a body without descending into nested
/// definitions, which collect their own calls.
fn collect_calls(node: Node, source: &str, calls: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" | "class_definition" => continue,
            "call" => {
                if let Some(func) = child.child_by_field_name("function") {
                    let target = match func.kind() {
                        "identifier" => func.utf8_text(source.as_bytes()).ok(),
                        // obj.method() records the trailing attribute name
                        "attribute" => func
                            .child_by_field_name("attribute")
                            .and_then(|a| a.utf8_text(source.as_bytes()).ok()),
                        _ => None,
                    };
                    if let Some(t) = target {
                        calls.push(t.to_string());
                    }
                }
                // Arguments can contain further calls
                collect_calls(child, source, calls);
            }
            _ => collect_calls(child, source, calls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ExtractedFile {
        PythonExtractor::new()
            .extract(Language::Python, source)
            .unwrap()
    }

    #[test]
    fn test_top_level_function_and_class() {
        let source = r#"
def alpha():
    pass


class Beta:
    def method(self):
        return 1
"#;
        let result = extract(source);
        let names: Vec<_> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Beta", "method"]);

        let alpha = &result.symbols[0];
        assert_eq!(alpha.kind, SymbolKind::Function);
        assert!(alpha.parent.is_none());

        let method = &result.symbols[2];
        assert_eq!(method.kind, SymbolKind::Method);
        assert_eq!(method.parent, Some(1));
    }

    #[test]
    fn test_parent_spans_enclose_children() {
        let source = r#"
class Outer:
    def first(self):
        pass

    def second(self):
        pass
"#;
        let result = extract(source);
        let outer = &result.symbols[0];
        for child in result.symbols.iter().filter(|s| s.parent == Some(0)) {
            assert!(outer.start_line <= child.start_line);
            assert!(outer.end_line >= child.end_line);
        }
    }

    #[test]
    fn test_signature_and_docstring() {
        let source = r#"
def greet(name, punctuation="!"):
    """Say hello."""
    return "hi " + name
"#;
        let result = extract(source);
        let greet = &result.symbols[0];
        assert_eq!(greet.signature.as_deref(), Some("greet(name, punctuation)"));
        assert_eq!(greet.docstring.as_deref(), Some("Say hello."));
    }

    #[test]
    fn test_async_function() {
        let result = extract("async def fetch():\n    pass\n");
        assert_eq!(result.symbols[0].kind, SymbolKind::AsyncFunction);
    }

    #[test]
    fn test_calls_bare_and_attribute() {
        let source = r#"
def caller():
    helper()
    client.send(payload)
"#;
        let result = extract(source);
        assert_eq!(result.symbols[0].calls, vec!["helper", "send"]);
    }

    #[test]
    fn test_nested_calls_stay_with_inner_def() {
        let source = r#"
def outer():
    def inner():
        deep()
    inner()
"#;
        let result = extract(source);
        let outer = &result.symbols[0];
        let inner = &result.symbols[1];
        assert_eq!(outer.calls, vec!["inner"]);
        assert_eq!(inner.calls, vec!["deep"]);
        assert_eq!(inner.parent, Some(0));
    }

    #[test]
    fn test_imports() {
        let source = "import os\nimport json.decoder\nfrom pathlib import Path\n";
        let result = extract(source);
        assert_eq!(result.imports, vec!["os", "json.decoder", "pathlib"]);
    }

    #[test]
    fn test_decorated_definition() {
        let source = "@wraps(fn)\ndef wrapped():\n    pass\n";
        let result = extract(source);
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "wrapped");
    }

    #[test]
    fn test_syntax_noise_is_not_fatal() {
        // tree-sitter produces a tree with error nodes; extraction still
        // returns whatever definitions it can find
        let result = extract("def ok():\n    pass\n\ndef broken(:\n");
        assert!(result.symbols.iter().any(|s| s.name == "ok"));
    }
}
