//! Regex heuristic extraction (tier 3).
//!
//! Per-language ordered rule lists applied line by line; the first
//! matching pattern on a line yields a symbol named by its first capture
//! group. End lines are estimated (start + fixed offset, clamped to the
//! file) since no structural span is available - callers must not rely on
//! heuristic end lines for exact extraction.

use super::SymbolExtractor;
use crate::language::Language;
use crate::symbol::{ExtractedFile, ParsedSymbol, SymbolKind};
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Estimated symbol span when only the defining line is known.
const ESTIMATED_SPAN: u32 = 8;

struct Rule {
    pattern: Regex,
    kind: SymbolKind,
}

fn rule(pattern: &str, kind: SymbolKind) -> Rule {
    Rule {
        // Patterns are static and known-valid
        pattern: Regex::new(pattern).unwrap(),
        kind,
    }
}

fn rules() -> &'static HashMap<Language, Vec<Rule>> {
    static RULES: OnceLock<HashMap<Language, Vec<Rule>>> = OnceLock::new();
    RULES.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert(
            Language::Java,
            vec![
                rule(r"^\s*(?:public\s+|protected\s+|private\s+|abstract\s+|static\s+|final\s+)*interface\s+(\w+)", SymbolKind::Interface),
                rule(r"^\s*(?:public\s+|protected\s+|private\s+|abstract\s+|static\s+|final\s+)*class\s+(\w+)", SymbolKind::Class),
                rule(r"^\s*(?:public|protected|private)[\w<>\[\],\s]*\s+(\w+)\s*\([^;]*$", SymbolKind::Method),
            ],
        );
        map.insert(
            Language::Cpp,
            vec![
                rule(r"^\s*(?:class|struct)\s+(\w+)", SymbolKind::Class),
                rule(r"^(?:[\w:<>~*&]+\s+)+\*?(\w+)\s*\([^;]*$", SymbolKind::Function),
            ],
        );
        map.insert(
            Language::C,
            vec![
                rule(r"^\s*struct\s+(\w+)", SymbolKind::Class),
                rule(r"^(?:[\w*]+\s+)+\*?(\w+)\s*\([^;]*$", SymbolKind::Function),
            ],
        );
        map.insert(
            Language::Ruby,
            vec![
                rule(r"^\s*def\s+(?:self\.)?([\w?!]+)", SymbolKind::Function),
                rule(r"^\s*class\s+([A-Z]\w*)", SymbolKind::Class),
                rule(r"^\s*module\s+([A-Z]\w*)", SymbolKind::Class),
            ],
        );
        map.insert(
            Language::Php,
            vec![
                rule(r"^\s*(?:abstract\s+|final\s+)?class\s+(\w+)", SymbolKind::Class),
                rule(r"^\s*interface\s+(\w+)", SymbolKind::Interface),
                rule(r"function\s+&?(\w+)\s*\(", SymbolKind::Function),
            ],
        );
        map.insert(
            Language::Bicep,
            vec![
                rule(r"^\s*resource\s+(\w+)", SymbolKind::Class),
                rule(r"^\s*module\s+(\w+)", SymbolKind::Class),
                rule(r"^\s*func\s+(\w+)", SymbolKind::Function),
            ],
        );
        // Fallbacks for the grammar-tier languages
        map.insert(
            Language::Javascript,
            vec![
                rule(r"^\s*(?:export\s+)?async\s+function\s*\*?\s*(\w+)", SymbolKind::AsyncFunction),
                rule(r"^\s*(?:export\s+)?function\s*\*?\s*(\w+)", SymbolKind::Function),
                rule(r"^\s*(?:export\s+)?class\s+(\w+)", SymbolKind::Class),
                rule(r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s*)?\(", SymbolKind::Function),
            ],
        );
        map.insert(
            Language::Typescript,
            vec![
                rule(r"^\s*(?:export\s+)?interface\s+(\w+)", SymbolKind::Interface),
                rule(r"^\s*(?:export\s+)?async\s+function\s*\*?\s*(\w+)", SymbolKind::AsyncFunction),
                rule(r"^\s*(?:export\s+)?function\s*\*?\s*(\w+)", SymbolKind::Function),
                rule(r"^\s*(?:export\s+)?(?:abstract\s+)?class\s+(\w+)", SymbolKind::Class),
            ],
        );
        map.insert(
            Language::Csharp,
            vec![
                rule(r"^\s*(?:public\s+|internal\s+|private\s+|protected\s+|partial\s+|static\s+|abstract\s+|sealed\s+)*interface\s+(\w+)", SymbolKind::Interface),
                rule(r"^\s*(?:public\s+|internal\s+|private\s+|protected\s+|partial\s+|static\s+|abstract\s+|sealed\s+)*class\s+(\w+)", SymbolKind::Class),
                rule(r"^\s*(?:public|internal|private|protected)[\w<>\[\],\s]*\s+(\w+)\s*\(", SymbolKind::Method),
            ],
        );
        map.insert(
            Language::Go,
            vec![
                rule(r"^func\s+(?:\([^)]*\)\s*)?(\w+)\s*\(", SymbolKind::Function),
                rule(r"^type\s+(\w+)\s+struct\b", SymbolKind::Class),
                rule(r"^type\s+(\w+)\s+interface\b", SymbolKind::Interface),
            ],
        );
        map.insert(
            Language::Rust,
            vec![
                rule(r"^\s*(?:pub(?:\([\w:\s]+\))?\s+)?(?:async\s+)?fn\s+(\w+)", SymbolKind::Function),
                rule(r"^\s*(?:pub(?:\([\w:\s]+\))?\s+)?struct\s+(\w+)", SymbolKind::Class),
                rule(r"^\s*(?:pub(?:\([\w:\s]+\))?\s+)?trait\s+(\w+)", SymbolKind::Interface),
            ],
        );
        map
    })
}

pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor for HeuristicExtractor {
    fn tier(&self) -> &'static str {
        "heuristic"
    }

    fn supports(&self, language: Language) -> bool {
        rules().contains_key(&language)
    }

    fn extract(&self, language: Language, source: &str) -> Result<ExtractedFile> {
        let mut out = ExtractedFile::default();
        let Some(lang_rules) = rules().get(&language) else {
            return Ok(out);
        };

        let total_lines = source.lines().count() as u32;
        for (i, line) in source.lines().enumerate() {
            let line_no = i as u32 + 1;
            for rule in lang_rules {
                if let Some(caps) = rule.pattern.captures(line) {
                    if let Some(name) = caps.get(1) {
                        let end = (line_no + ESTIMATED_SPAN).min(total_lines.max(line_no));
                        out.symbols.push(ParsedSymbol::new(
                            rule.kind,
                            name.as_str(),
                            line_no,
                            end,
                        ));
                    }
                    break;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(language: Language, source: &str) -> ExtractedFile {
        HeuristicExtractor::new().extract(language, source).unwrap()
    }

    #[test]
    fn test_ruby_defs() {
        let source = "class Greeter\n  def greet(name)\n    puts name\n  end\nend\n";
        let result = extract(Language::Ruby, source);
        let names: Vec<_> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Greeter", "greet"]);
        assert_eq!(result.symbols[0].kind, SymbolKind::Class);
    }

    #[test]
    fn test_first_rule_wins_per_line() {
        // "module" line must not also match something else
        let result = extract(Language::Ruby, "module Admin\nend\n");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].kind, SymbolKind::Class);
    }

    #[test]
    fn test_estimated_end_line_is_clamped() {
        let result = extract(Language::Php, "<?php\nfunction tail() {\n}\n");
        let tail = &result.symbols[0];
        assert_eq!(tail.start_line, 2);
        assert!(tail.end_line <= 3);
    }

    #[test]
    fn test_java_members() {
        let source = r#"
public class Account {
    private int balance;

    public int getBalance() {
        return balance;
    }
}
"#;
        let result = extract(Language::Java, source);
        let names: Vec<_> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Account"));
        assert!(names.contains(&"getBalance"));
    }

    #[test]
    fn test_unsupported_language_empty() {
        let extractor = HeuristicExtractor::new();
        assert!(!extractor.supports(Language::Python));
    }
}
