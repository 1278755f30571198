//! File-level dependency graph.
//!
//! Nodes are repo-relative file paths plus the raw import targets they
//! reference; edges are the "imports" relation with set semantics. Import
//! targets stay unresolved — `from backend import graph` produces an edge
//! to the string `backend.graph`, not to a file path.
//!
//! The graph is built during ingestion, persisted as JSON, and loaded
//! read-only afterwards. Files that cannot be read are skipped without
//! failing the build.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Directed file-import graph with deterministic iteration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    edges: BTreeSet<(String, String)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse import-like declarations from `file` and record them.
    ///
    /// The file gets a node keyed by its repo-relative path even when it
    /// declares no imports. Unreadable files and files in languages we do
    /// not parse contribute nothing; neither case is an error.
    pub fn parse_file(&mut self, file: &Path, repo_root: &Path) {
        let Some(language) = parse_language(file) else {
            return;
        };
        let Ok(content) = std::fs::read_to_string(file) else {
            return;
        };

        let rel_path = file
            .strip_prefix(repo_root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");

        self.nodes.insert(rel_path.clone());

        for line in content.lines() {
            if let Some(target) = extract_import(language, line) {
                self.nodes.insert(target.clone());
                self.edges.insert((rel_path.clone(), target));
            }
        }
    }

    /// Out-edges of `path`: what it imports. Empty set for unknown nodes.
    pub fn get_dependencies(&self, path: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(from, _)| from == path)
            .map(|(_, to)| to.clone())
            .collect()
    }

    /// In-edges of `path`: what imports it. Empty set for unknown nodes.
    pub fn get_dependents(&self, path: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(_, to)| to == path)
            .map(|(from, _)| from.clone())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Persist the graph as JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write graph to {}", path.display()))?;
        Ok(())
    }

    /// Load a previously saved graph. A missing file yields an empty graph.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph from {}", path.display()))?;
        let graph = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse graph at {}", path.display()))?;
        Ok(graph)
    }

    /// Render the graph as a Mermaid flowchart.
    ///
    /// Each node gets a stable `nodeN` identifier in iteration order;
    /// double quotes in labels are replaced with single quotes. Edges
    /// whose endpoints are not mapped are omitted.
    pub fn to_diagram(&self) -> String {
        let mut lines = vec!["graph TD".to_string()];
        let mut ids = std::collections::BTreeMap::new();

        for (i, node) in self.nodes.iter().enumerate() {
            let id = format!("node{}", i);
            let label = node.replace('"', "'");
            lines.push(format!("    {}[\"{}\"]", id, label));
            ids.insert(node.as_str(), id);
        }

        for (from, to) in &self.edges {
            if let (Some(a), Some(b)) = (ids.get(from.as_str()), ids.get(to.as_str())) {
                lines.push(format!("    {} --> {}", a, b));
            }
        }

        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseLanguage {
    Python,
    Rust,
    JavaScript,
}

fn parse_language(file: &Path) -> Option<ParseLanguage> {
    match file.extension()?.to_str()? {
        "py" => Some(ParseLanguage::Python),
        "rs" => Some(ParseLanguage::Rust),
        "js" | "jsx" | "ts" | "tsx" | "mjs" => Some(ParseLanguage::JavaScript),
        _ => None,
    }
}

/// Extract the raw import target from one line of source, if any.
fn extract_import(language: ParseLanguage, line: &str) -> Option<String> {
    let line = line.trim();
    match language {
        ParseLanguage::Python => {
            if let Some(rest) = line.strip_prefix("from ") {
                let module = rest.split_whitespace().next()?;
                if module != "." {
                    return Some(module.trim_start_matches('.').to_string())
                        .filter(|m| !m.is_empty());
                }
                None
            } else if let Some(rest) = line.strip_prefix("import ") {
                // `import a.b as c, d` — first target only, as-clause dropped.
                let module = rest.split(',').next()?.split_whitespace().next()?;
                Some(module.to_string())
            } else {
                None
            }
        }
        ParseLanguage::Rust => {
            let rest = line.strip_prefix("use ")?;
            let target = rest
                .trim_end_matches(';')
                .split("::")
                .next()?
                .trim()
                .to_string();
            match target.as_str() {
                "" | "std" | "core" | "alloc" | "self" | "super" => None,
                _ => Some(target),
            }
        }
        ParseLanguage::JavaScript => {
            // `import x from 'mod'` / `import 'mod'` / `require('mod')`
            let quoted = if line.starts_with("import ") || line.starts_with("export ") {
                let from_idx = line.rfind(" from ");
                let tail = match from_idx {
                    Some(i) => &line[i + 6..],
                    None => line.strip_prefix("import ")?,
                };
                tail.trim().trim_end_matches(';')
            } else if let Some(i) = line.find("require(") {
                line[i + 8..].split(')').next()?
            } else {
                return None;
            };
            let target = quoted.trim().trim_matches(|c| c == '\'' || c == '"' || c == '`');
            if target.is_empty() || target.contains(char::is_whitespace) {
                None
            } else {
                Some(target.to_string())
            }
        }
    }
}
