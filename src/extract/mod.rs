//! Symbol extraction - tiered fallback behind one capability interface.
//!
//! Three tiers, tried in order, first non-empty result wins:
//! 1. Native structural parse (python) - exact tree with nesting, calls,
//!    docstrings, imports
//! 2. Generic grammar parse (javascript, typescript, csharp, go, rust) -
//!    definition/declaration nodes only, no nesting or call info
//! 3. Regex heuristics (remaining languages, and fallback for tier 2) -
//!    line rules with estimated end lines
//!
//! A parse failure at any tier yields an empty extraction for that file,
//! never a fatal error; indexing continues with the next file.

pub mod grammar;
pub mod heuristic;
pub mod python;

use crate::language::Language;
use crate::symbol::ExtractedFile;

pub use grammar::GrammarExtractor;
pub use heuristic::HeuristicExtractor;
pub use python::PythonExtractor;

/// One extraction tier.
pub trait SymbolExtractor: Send + Sync {
    /// Tier name for logging
    fn tier(&self) -> &'static str;

    /// Whether this tier handles the given language
    fn supports(&self, language: Language) -> bool;

    /// Extract symbols from file content. An empty result means "nothing
    /// found here, let the next tier try".
    fn extract(&self, language: Language, source: &str) -> crate::Result<ExtractedFile>;
}

/// Prioritized list of extraction tiers.
pub struct TieredExtractor {
    tiers: Vec<Box<dyn SymbolExtractor>>,
}

impl TieredExtractor {
    /// Build the default chain: native python, generic grammar, regex.
    pub fn with_default_tiers() -> Self {
        Self {
            tiers: vec![
                Box::new(PythonExtractor::new()),
                Box::new(GrammarExtractor::new()),
                Box::new(HeuristicExtractor::new()),
            ],
        }
    }

    /// Build a chain from explicit tiers (test seam).
    pub fn new(tiers: Vec<Box<dyn SymbolExtractor>>) -> Self {
        Self { tiers }
    }

    /// Run the fallback chain. Failures are logged and treated as empty.
    pub fn extract(&self, language: Language, source: &str) -> ExtractedFile {
        for tier in &self.tiers {
            if !tier.supports(language) {
                continue;
            }
            match tier.extract(language, source) {
                Ok(result) if !result.symbols.is_empty() => {
                    tracing::debug!(
                        tier = tier.tier(),
                        language = %language,
                        symbols = result.symbols.len(),
                        "extraction succeeded"
                    );
                    return result;
                }
                Ok(_) => continue,
                Err(err) => {
                    tracing::debug!(
                        tier = tier.tier(),
                        language = %language,
                        error = %err,
                        "extraction tier failed, trying next"
                    );
                    continue;
                }
            }
        }
        ExtractedFile::default()
    }
}

impl Default for TieredExtractor {
    fn default() -> Self {
        Self::with_default_tiers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ParsedSymbol, SymbolKind};

    struct FailingTier;

    impl SymbolExtractor for FailingTier {
        fn tier(&self) -> &'static str {
            "failing"
        }
        fn supports(&self, _language: Language) -> bool {
            true
        }
        fn extract(&self, _language: Language, _source: &str) -> crate::Result<ExtractedFile> {
            Err(crate::Error::Parse("boom".into()))
        }
    }

    struct FixedTier;

    impl SymbolExtractor for FixedTier {
        fn tier(&self) -> &'static str {
            "fixed"
        }
        fn supports(&self, _language: Language) -> bool {
            true
        }
        fn extract(&self, _language: Language, _source: &str) -> crate::Result<ExtractedFile> {
            let mut out = ExtractedFile::default();
            out.symbols
                .push(ParsedSymbol::new(SymbolKind::Function, "found", 1, 2));
            Ok(out)
        }
    }

    #[test]
    fn test_falls_through_failing_tier() {
        let chain = TieredExtractor::new(vec![Box::new(FailingTier), Box::new(FixedTier)]);
        let result = chain.extract(Language::Ruby, "anything");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "found");
    }

    #[test]
    fn test_empty_when_no_tier_supports() {
        let chain = TieredExtractor::new(vec![]);
        let result = chain.extract(Language::Ruby, "def x; end");
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn test_default_chain_python_uses_native_only() {
        let chain = TieredExtractor::with_default_tiers();
        let result = chain.extract(Language::Python, "def alpha():\n    pass\n");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "alpha");
    }
}
