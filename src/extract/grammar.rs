//! Generic grammar extraction (tier 2).
//!
//! For languages with an available tree-sitter grammar but no native
//! walker, locate definition/declaration nodes from a per-language kind
//! list, take the first identifier-like child as the name, and infer the
//! symbol kind by substring match on the node type. Spans are 0-based in
//! the tree and reported 1-based. No nesting or call information is
//! produced at this tier.

use super::SymbolExtractor;
use crate::language::Language;
use crate::symbol::{ExtractedFile, ParsedSymbol, SymbolKind};
use crate::{Error, Result};
use tree_sitter::{Node, Parser};

/// Node kinds treated as definitions, per language.
fn definition_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Javascript => &[
            "function_declaration",
            "generator_function_declaration",
            "class_declaration",
            "method_definition",
        ],
        Language::Typescript => &[
            "function_declaration",
            "class_declaration",
            "interface_declaration",
            "method_definition",
        ],
        Language::Csharp => &[
            "class_declaration",
            "interface_declaration",
            "struct_declaration",
            "method_declaration",
            "constructor_declaration",
        ],
        Language::Go => &["function_declaration", "method_declaration"],
        Language::Rust => &["function_item", "struct_item", "trait_item"],
        _ => &[],
    }
}

fn grammar_for(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Javascript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::Typescript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Csharp => Some(tree_sitter_c_sharp::LANGUAGE.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        _ => None,
    }
}

/// Kind inference by substring on the grammar node type.
fn infer_kind(node_kind: &str) -> SymbolKind {
    if node_kind.contains("interface") || node_kind.contains("trait") {
        SymbolKind::Interface
    } else if node_kind.contains("class") || node_kind.contains("struct") {
        SymbolKind::Class
    } else if node_kind.contains("method") || node_kind.contains("constructor") {
        SymbolKind::Method
    } else {
        SymbolKind::Function
    }
}

/// Child kinds accepted as the defining identifier.
const NAME_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "property_identifier",
    "field_identifier",
    "name",
];

pub struct GrammarExtractor;

impl GrammarExtractor {
    pub fn new() -> Self {
        Self
    }

    fn parse(&self, language: Language, source: &str) -> Result<ExtractedFile> {
        let grammar = grammar_for(language)
            .ok_or_else(|| Error::Parse(format!("no grammar for {}", language)))?;
        let kinds = definition_kinds(language);

        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| Error::Parse(format!("failed to load {} grammar: {}", language, e)))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| Error::Parse(format!("{} parse returned no tree", language)))?;

        let mut out = ExtractedFile::default();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if kinds.contains(&node.kind()) {
                if let Some(name) = first_identifier(node, source) {
                    out.symbols.push(ParsedSymbol::new(
                        infer_kind(node.kind()),
                        name,
                        node.start_position().row as u32 + 1,
                        node.end_position().row as u32 + 1,
                    ));
                }
            }
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    stack.push(child);
                }
            }
        }

        // Stack traversal scrambles source order
        out.symbols.sort_by_key(|s| s.start_line);
        Ok(out)
    }
}

impl Default for GrammarExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor for GrammarExtractor {
    fn tier(&self) -> &'static str {
        "grammar"
    }

    fn supports(&self, language: Language) -> bool {
        grammar_for(language).is_some()
    }

    fn extract(&self, language: Language, source: &str) -> Result<ExtractedFile> {
        self.parse(language, source)
    }
}

fn first_identifier(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if NAME_KINDS.contains(&child.kind()) {
            return child
                .utf8_text(source.as_bytes())
                .ok()
                .map(|s| s.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(language: Language, source: &str) -> ExtractedFile {
        GrammarExtractor::new().extract(language, source).unwrap()
    }

    #[test]
    fn test_javascript_functions_and_classes() {
        let source = r#"
function greet(name) {
    return "hi " + name;
}

class Widget {
    render() {
        return greet("w");
    }
}
"#;
        let result = extract(Language::Javascript, source);
        let names: Vec<_> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["greet", "Widget", "render"]);
        assert_eq!(result.symbols[0].kind, SymbolKind::Function);
        assert_eq!(result.symbols[1].kind, SymbolKind::Class);
        assert_eq!(result.symbols[2].kind, SymbolKind::Method);
    }

    #[test]
    fn test_typescript_interface() {
        let source = "interface Shape {\n  area(): number;\n}\n";
        let result = extract(Language::Typescript, source);
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "Shape");
        assert_eq!(result.symbols[0].kind, SymbolKind::Interface);
    }

    #[test]
    fn test_csharp_members() {
        let source = r#"
public interface IRunner {
    void Run();
}

public class Runner {
    public void Run() { }
}
"#;
        let result = extract(Language::Csharp, source);
        let names: Vec<_> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"IRunner"));
        assert!(names.contains(&"Runner"));
        assert!(names.contains(&"Run"));
    }

    #[test]
    fn test_one_based_lines() {
        let source = "function first() {}\n";
        let result = extract(Language::Javascript, source);
        assert_eq!(result.symbols[0].start_line, 1);
        assert_eq!(result.symbols[0].end_line, 1);
    }

    #[test]
    fn test_rust_items() {
        let source = "pub struct Point { x: i32 }\n\ntrait Draw { }\n\nfn main() { }\n";
        let result = extract(Language::Rust, source);
        let kinds: Vec<_> = result.symbols.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SymbolKind::Class, SymbolKind::Interface, SymbolKind::Function]
        );
    }

    #[test]
    fn test_no_nesting_or_calls_at_this_tier() {
        let source = "class A { inner() { other(); } }\n";
        let result = extract(Language::Javascript, source);
        for symbol in &result.symbols {
            assert!(symbol.parent.is_none());
            assert!(symbol.calls.is_empty());
        }
    }
}
