//! Symbol types shared by the extractor tiers and the indexing pipeline.
//!
//! Extraction produces arena-shaped records: `ParsedSymbol.parent` is an
//! index into the extraction list, and parents always precede their
//! children, so the store can re-link by row id in a single pass.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kinds of extracted symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    AsyncFunction,
    Method,
    Class,
    Interface,
}

impl SymbolKind {
    /// Get the string representation of the symbol kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::AsyncFunction => "async_function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
        }
    }
}

impl FromStr for SymbolKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "function" | "fn" | "def" => Ok(SymbolKind::Function),
            "async_function" => Ok(SymbolKind::AsyncFunction),
            "method" => Ok(SymbolKind::Method),
            "class" | "struct" => Ok(SymbolKind::Class),
            "interface" | "trait" => Ok(SymbolKind::Interface),
            _ => Err(crate::Error::InvalidArgument(format!(
                "Unknown symbol kind: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A symbol produced by one extraction pass over a single file.
///
/// Lines are 1-indexed and inclusive. `calls` holds the raw called names
/// found in the symbol body; they stay unresolved until the pipeline
/// matches them against names in the same file.
#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub kind: SymbolKind,
    pub name: String,
    /// Index of the enclosing symbol within the same extraction, if any.
    /// Invariant: `parent < own index`, parents are emitted first.
    pub parent: Option<usize>,
    pub start_line: u32,
    pub end_line: u32,
    /// Name plus ordered parameter names, e.g. `alpha(a, b)`.
    pub signature: Option<String>,
    /// Leading string literal of the definition body, if the language has
    /// the concept.
    pub docstring: Option<String>,
    /// Raw call-target names: bare identifiers or the trailing attribute
    /// of a member call. Deliberately unresolved by type.
    pub calls: Vec<String>,
}

impl ParsedSymbol {
    pub fn new(kind: SymbolKind, name: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            kind,
            name: name.into(),
            parent: None,
            start_line,
            end_line,
            signature: None,
            docstring: None,
            calls: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }
}

/// Result of extracting one file: the symbol list plus module imports.
#[derive(Debug, Default)]
pub struct ExtractedFile {
    pub symbols: Vec<ParsedSymbol>,
    /// Imported module names (dotted), resolved later against the file
    /// table. Only tiers that understand imports fill this in.
    pub imports: Vec<String>,
}

impl ExtractedFile {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.imports.is_empty()
    }
}

/// How deep the pipeline stores extracted symbols.
///
/// `TopLevel` keeps only parentless records (one top-level function plus
/// one class index as two symbols, methods are not stored). `Nested`
/// stores the full tree with parent links. The extractors always produce
/// the full tree; this policy is applied when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionDepth {
    #[default]
    TopLevel,
    Nested,
}

impl FromStr for ExtractionDepth {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "top-level" | "top_level" | "flat" => Ok(ExtractionDepth::TopLevel),
            "nested" | "full" => Ok(ExtractionDepth::Nested),
            _ => Err(crate::Error::InvalidArgument(format!(
                "Unknown extraction depth: {}",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::AsyncFunction,
            SymbolKind::Method,
            SymbolKind::Class,
            SymbolKind::Interface,
        ] {
            let parsed: SymbolKind = kind.as_str().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_builder() {
        let sym = ParsedSymbol::new(SymbolKind::Function, "validate", 10, 25)
            .with_signature("validate(token)")
            .with_docstring("Validates a token");
        assert_eq!(sym.name, "validate");
        assert!(sym.parent.is_none());
        assert_eq!(sym.signature.as_deref(), Some("validate(token)"));
    }
}
