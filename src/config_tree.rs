//! Configuration file parsing and diffing.
//!
//! JSON, YAML, and XML files become generic key-path trees; other known
//! config formats are tagged but not deep-parsed. Trees are arena-shaped:
//! nodes live in a flat list and reference their parent by index, with
//! parents always preceding children.
//!
//! Key paths use dot/bracket notation: `database.hosts[0].port`,
//! `server.@timeout` for XML attributes.

use crate::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;

/// Detected configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Json,
    Yaml,
    Xml,
    Toml,
    Ini,
    Docker,
    Env,
    Makefile,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Xml => "xml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Ini => "ini",
            ConfigFormat::Docker => "docker",
            ConfigFormat::Env => "env",
            ConfigFormat::Makefile => "makefile",
        }
    }

    /// Only these formats are parsed into trees; the rest are tagged.
    pub fn is_deep_parsed(&self) -> bool {
        matches!(self, ConfigFormat::Json | ConfigFormat::Yaml | ConfigFormat::Xml)
    }

    /// Detect format by extension first, then by exact filename for
    /// extensionless conventions.
    pub fn detect(path: &Path) -> Option<ConfigFormat> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            match ext.to_lowercase().as_str() {
                "json" | "jsonc" => return Some(ConfigFormat::Json),
                "yaml" | "yml" => return Some(ConfigFormat::Yaml),
                "xml" => return Some(ConfigFormat::Xml),
                "toml" => return Some(ConfigFormat::Toml),
                "ini" | "cfg" | "properties" => return Some(ConfigFormat::Ini),
                _ => {}
            }
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())?
            .to_lowercase();
        if name == "dockerfile" || name == ".dockerignore" {
            Some(ConfigFormat::Docker)
        } else if name.starts_with(".env") {
            Some(ConfigFormat::Env)
        } else if name == "makefile" || name == "gnumakefile" {
            Some(ConfigFormat::Makefile)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConfigFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ConfigFormat::Json),
            "yaml" => Ok(ConfigFormat::Yaml),
            "xml" => Ok(ConfigFormat::Xml),
            "toml" => Ok(ConfigFormat::Toml),
            "ini" => Ok(ConfigFormat::Ini),
            "docker" => Ok(ConfigFormat::Docker),
            "env" => Ok(ConfigFormat::Env),
            "makefile" => Ok(ConfigFormat::Makefile),
            _ => Err(crate::Error::InvalidArgument(format!(
                "Unknown config format: {}",
                s
            ))),
        }
    }
}

/// Type tag of a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Null => "null",
        }
    }
}

/// One node in a parsed configuration tree (arena record).
#[derive(Debug, Clone)]
pub struct ConfigNodeRec {
    pub key: String,
    pub key_path: String,
    /// Stringified scalar; None for containers and nulls.
    pub value: Option<String>,
    pub value_type: ValueType,
    pub line_number: Option<i64>,
    /// Index of the parent node in the same arena; parents come first.
    pub parent: Option<usize>,
}

/// A fully parsed configuration file.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    pub path: String,
    pub format: ConfigFormat,
    pub raw_content: String,
    pub hash: String,
    pub nodes: Vec<ConfigNodeRec>,
}

/// One modified key path with both values.
#[derive(Debug, Clone, Serialize)]
pub struct ModifiedPath {
    pub key_path: String,
    pub old_value: String,
    pub new_value: String,
}

/// Classification of every leaf key path across two trees.
#[derive(Debug, Default, Serialize)]
pub struct ConfigDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<ModifiedPath>,
    pub unchanged: Vec<String>,
}

impl ConfigDiff {
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Parse a configuration file from disk. Unknown formats, shallow-only
/// formats, unreadable files, scalar roots, and parse failures all yield
/// `None` ("not indexable"), never an error.
pub fn parse_config_file(path: &Path) -> Result<Option<ConfigTree>> {
    if !path.is_file() {
        return Ok(None);
    }
    let Some(format) = ConfigFormat::detect(path) else {
        return Ok(None);
    };
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "unreadable config file");
            return Ok(None);
        }
    };
    Ok(parse_config_str(
        &path.to_string_lossy(),
        format,
        &content,
    ))
}

/// Parse configuration content that has already been read.
pub fn parse_config_str(path: &str, format: ConfigFormat, content: &str) -> Option<ConfigTree> {
    if !format.is_deep_parsed() {
        return None;
    }
    let nodes = match format {
        ConfigFormat::Json => parse_json(content),
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Xml => parse_xml(content),
        _ => Vec::new(),
    };
    if nodes.is_empty() {
        return None;
    }
    Some(ConfigTree {
        path: path.to_string(),
        format,
        raw_content: content.to_string(),
        hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
        nodes,
    })
}

/// Diff two trees over their leaf key paths. Values compare as strings.
pub fn diff_trees(old: &ConfigTree, new: &ConfigTree) -> ConfigDiff {
    let old_leaves = flatten_leaves(old);
    let new_leaves = flatten_leaves(new);

    let mut diff = ConfigDiff::default();
    for (path, _) in &new_leaves {
        if !old_leaves.contains_key(path) {
            diff.added.push(path.clone());
        }
    }
    for (path, old_value) in &old_leaves {
        match new_leaves.get(path) {
            None => diff.removed.push(path.clone()),
            Some(new_value) if new_value != old_value => diff.modified.push(ModifiedPath {
                key_path: path.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            }),
            Some(_) => diff.unchanged.push(path.clone()),
        }
    }
    diff
}

/// Leaf key paths and their stringified values.
fn flatten_leaves(tree: &ConfigTree) -> std::collections::BTreeMap<String, String> {
    tree.nodes
        .iter()
        .filter_map(|n| n.value.as_ref().map(|v| (n.key_path.clone(), v.clone())))
        .collect()
}

// --- JSON / YAML ---

fn parse_json(content: &str) -> Vec<ConfigNodeRec> {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => nodes_from_root(&value),
        Err(_) => Vec::new(),
    }
}

fn parse_yaml(content: &str) -> Vec<ConfigNodeRec> {
    let Ok(yaml) = serde_yaml_ng::from_str::<serde_yaml_ng::Value>(content) else {
        return Vec::new();
    };
    // Reuse the JSON builder; YAML maps with non-string keys fail the
    // conversion and the file is treated as not indexable.
    match serde_json::to_value(&yaml) {
        Ok(value) => nodes_from_root(&value),
        Err(_) => Vec::new(),
    }
}

/// Objects become one node per key; top-level arrays become `[i]`-prefixed
/// key paths. Scalar roots yield no tree.
fn nodes_from_root(value: &serde_json::Value) -> Vec<ConfigNodeRec> {
    let mut nodes = Vec::new();
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                add_value(&mut nodes, key, key.clone(), child, None);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if let serde_json::Value::Object(map) = item {
                    for (key, child) in map {
                        let key_path = format!("[{}].{}", i, key);
                        add_value(&mut nodes, key, key_path, child, None);
                    }
                }
            }
        }
        _ => {}
    }
    nodes
}

fn value_type_of(value: &serde_json::Value) -> ValueType {
    match value {
        serde_json::Value::Null => ValueType::Null,
        serde_json::Value::Bool(_) => ValueType::Boolean,
        serde_json::Value::Number(_) => ValueType::Number,
        serde_json::Value::String(_) => ValueType::String,
        serde_json::Value::Array(_) => ValueType::Array,
        serde_json::Value::Object(_) => ValueType::Object,
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn add_value(
    nodes: &mut Vec<ConfigNodeRec>,
    key: &str,
    key_path: String,
    value: &serde_json::Value,
    parent: Option<usize>,
) {
    let value_type = value_type_of(value);
    let idx = nodes.len();
    nodes.push(ConfigNodeRec {
        key: key.to_string(),
        key_path: key_path.clone(),
        value: scalar_to_string(value),
        value_type,
        line_number: None,
        parent,
    });

    match value {
        serde_json::Value::Object(map) => {
            for (child_key, child) in map {
                let child_path = format!("{}.{}", key_path, child_key);
                add_value(nodes, child_key, child_path, child, Some(idx));
            }
        }
        serde_json::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let child_key = format!("[{}]", i);
                let child_path = format!("{}[{}]", key_path, i);
                add_value(nodes, &child_key, child_path, item, Some(idx));
            }
        }
        _ => {}
    }
}

// --- XML ---

struct XmlElement {
    tag: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlElement>,
}

fn parse_xml(content: &str) -> Vec<ConfigNodeRec> {
    let Some(root) = read_xml_root(content) else {
        return Vec::new();
    };
    let mut nodes = Vec::new();
    add_xml_element(&mut nodes, &root, String::new(), None);
    nodes
}

fn read_xml_root(content: &str) -> Option<XmlElement> {
    let mut reader = Reader::from_str(content);
    let mut stack: Vec<XmlElement> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(element_from_start(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Some(element),
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let decoded = text.unescape().ok()?;
                    let trimmed = decoded.trim();
                    if !trimmed.is_empty() {
                        top.text = Some(trimmed.to_string());
                    }
                }
            }
            Ok(Event::End(_)) => {
                let element = stack.pop()?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Some(element),
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart) -> Option<XmlElement> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.ok()?;
        attrs.push((
            String::from_utf8_lossy(attr.key.as_ref()).to_string(),
            String::from_utf8_lossy(&attr.value).to_string(),
        ));
    }
    Some(XmlElement {
        tag,
        attrs,
        text: None,
        children: Vec::new(),
    })
}

/// Elements become nodes; each attribute becomes a synthetic `@attr`
/// child; element text becomes the node value when there are no child
/// elements.
fn add_xml_element(
    nodes: &mut Vec<ConfigNodeRec>,
    element: &XmlElement,
    parent_path: String,
    parent: Option<usize>,
) {
    let key_path = if parent_path.is_empty() {
        element.tag.clone()
    } else {
        format!("{}.{}", parent_path, element.tag)
    };
    let has_children = !element.children.is_empty();
    let (value, value_type) = if has_children {
        (None, ValueType::Object)
    } else {
        match &element.text {
            Some(text) => (Some(text.clone()), ValueType::String),
            None => (None, ValueType::Object),
        }
    };

    let idx = nodes.len();
    nodes.push(ConfigNodeRec {
        key: element.tag.clone(),
        key_path: key_path.clone(),
        value,
        value_type,
        line_number: None,
        parent,
    });

    for (attr_key, attr_value) in &element.attrs {
        nodes.push(ConfigNodeRec {
            key: format!("@{}", attr_key),
            key_path: format!("{}.@{}", key_path, attr_key),
            value: Some(attr_value.clone()),
            value_type: ValueType::String,
            line_number: None,
            parent: Some(idx),
        });
    }

    for child in &element.children {
        add_xml_element(nodes, child, key_path.clone(), Some(idx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(format: ConfigFormat, content: &str) -> ConfigTree {
        parse_config_str("test", format, content).unwrap()
    }

    fn paths(tree: &ConfigTree) -> Vec<&str> {
        tree.nodes.iter().map(|n| n.key_path.as_str()).collect()
    }

    #[test]
    fn test_json_object_paths() {
        let t = tree(
            ConfigFormat::Json,
            r#"{"database": {"host": "localhost", "port": 5432}}"#,
        );
        assert_eq!(
            paths(&t),
            vec!["database", "database.host", "database.port"]
        );
        let port = t.nodes.iter().find(|n| n.key == "port").unwrap();
        assert_eq!(port.value.as_deref(), Some("5432"));
        assert_eq!(port.value_type, ValueType::Number);
    }

    #[test]
    fn test_array_bracket_paths() {
        let t = tree(
            ConfigFormat::Json,
            r#"{"hosts": [{"port": 1}, {"port": 2}]}"#,
        );
        assert!(paths(&t).contains(&"hosts[0].port"));
        assert!(paths(&t).contains(&"hosts[1].port"));
    }

    #[test]
    fn test_parent_indices_precede_children() {
        let t = tree(ConfigFormat::Json, r#"{"a": {"b": {"c": 1}}}"#);
        for (idx, node) in t.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                assert!(parent < idx);
            }
        }
    }

    #[test]
    fn test_scalar_root_not_indexable() {
        assert!(parse_config_str("test", ConfigFormat::Json, "42").is_none());
        assert!(parse_config_str("test", ConfigFormat::Json, "not json").is_none());
    }

    #[test]
    fn test_shallow_format_not_indexable() {
        assert!(parse_config_str("test", ConfigFormat::Toml, "key = 1").is_none());
    }

    #[test]
    fn test_yaml_tree() {
        let t = tree(ConfigFormat::Yaml, "server:\n  port: 8080\n  debug: true\n");
        let debug = t.nodes.iter().find(|n| n.key == "debug").unwrap();
        assert_eq!(debug.value_type, ValueType::Boolean);
        assert_eq!(debug.key_path, "server.debug");
    }

    #[test]
    fn test_xml_attributes() {
        let t = tree(
            ConfigFormat::Xml,
            r#"<server timeout="30"><host>db</host></server>"#,
        );
        let attr = t.nodes.iter().find(|n| n.key == "@timeout").unwrap();
        assert_eq!(attr.key_path, "server.@timeout");
        assert_eq!(attr.value.as_deref(), Some("30"));
        let host = t.nodes.iter().find(|n| n.key == "host").unwrap();
        assert_eq!(host.value.as_deref(), Some("db"));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ConfigFormat::detect(Path::new("app.yaml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(
            ConfigFormat::detect(Path::new("Dockerfile")),
            Some(ConfigFormat::Docker)
        );
        assert_eq!(
            ConfigFormat::detect(Path::new(".env.local")),
            Some(ConfigFormat::Env)
        );
        assert_eq!(ConfigFormat::detect(Path::new("readme.md")), None);
    }

    #[test]
    fn test_diff_self_is_clean() {
        let t = tree(
            ConfigFormat::Json,
            r#"{"a": 1, "b": {"c": "x", "d": [1, 2]}}"#,
        );
        let diff = diff_trees(&t, &t);
        assert!(diff.is_clean());
        // every leaf key path is reported unchanged
        let leaves = ["a", "b.c", "b.d[0]", "b.d[1]"];
        for leaf in leaves {
            assert!(diff.unchanged.iter().any(|p| p == leaf), "missing {}", leaf);
        }
    }

    #[test]
    fn test_diff_classification() {
        let old = tree(ConfigFormat::Json, r#"{"keep": 1, "drop": 2, "change": 3}"#);
        let new = tree(ConfigFormat::Json, r#"{"keep": 1, "change": 4, "fresh": 5}"#);
        let diff = diff_trees(&old, &new);
        assert_eq!(diff.added, vec!["fresh"]);
        assert_eq!(diff.removed, vec!["drop"]);
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].key_path, "change");
        assert_eq!(diff.modified[0].old_value, "3");
        assert_eq!(diff.modified[0].new_value, "4");
        assert_eq!(diff.unchanged, vec!["keep"]);
    }
}
