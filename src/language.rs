//! Language detection - file extension to language tag.
//!
//! A pure mapping with no side effects: unknown extensions return `None`,
//! which the indexing pipeline reads as "skip this file".

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Languages the extractor tiers know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Typescript,
    Csharp,
    Go,
    Java,
    Cpp,
    C,
    Rust,
    Ruby,
    Php,
    Bicep,
}

/// Extension table, checked in order; first match wins.
static EXTENSIONS: &[(Language, &[&str])] = &[
    (Language::Python, &["py", "pyi"]),
    (Language::Javascript, &["js", "jsx", "mjs", "cjs"]),
    (Language::Typescript, &["ts", "tsx", "mts", "cts"]),
    (Language::Csharp, &["cs", "csx"]),
    (Language::Go, &["go"]),
    (Language::Java, &["java"]),
    (Language::Cpp, &["cpp", "cc", "cxx", "hpp", "hh"]),
    (Language::C, &["c", "h"]),
    (Language::Rust, &["rs"]),
    (Language::Ruby, &["rb", "rake"]),
    (Language::Php, &["php"]),
    (Language::Bicep, &["bicep", "bicepparam"]),
];

impl Language {
    /// Detect the language of a file from its (lowercased) extension.
    pub fn detect(path: &Path) -> Option<Language> {
        let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();
        EXTENSIONS
            .iter()
            .find(|(_, exts)| exts.contains(&ext.as_str()))
            .map(|(lang, _)| *lang)
    }

    /// Get the string representation of the language
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Csharp => "csharp",
            Language::Go => "go",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Rust => "rust",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Bicep => "bicep",
        }
    }

    /// All known languages
    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::Javascript,
            Language::Typescript,
            Language::Csharp,
            Language::Go,
            Language::Java,
            Language::Cpp,
            Language::C,
            Language::Rust,
            Language::Ruby,
            Language::Php,
            Language::Bicep,
        ]
    }
}

impl FromStr for Language {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::Javascript),
            "typescript" | "ts" => Ok(Language::Typescript),
            "csharp" | "c#" | "cs" => Ok(Language::Csharp),
            "go" | "golang" => Ok(Language::Go),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            "rust" | "rs" => Ok(Language::Rust),
            "ruby" | "rb" => Ok(Language::Ruby),
            "php" => Ok(Language::Php),
            "bicep" => Ok(Language::Bicep),
            _ => Err(crate::Error::InvalidArgument(format!(
                "Unknown language: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
