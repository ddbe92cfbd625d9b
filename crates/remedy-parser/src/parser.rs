use crate::PythonGrammar;
use remedy_core::{RemedyError, Result};
use tracing::debug;
use tree_sitter::{Node, Tree};

pub struct PythonParser {
    grammar: PythonGrammar,
}

impl PythonParser {
    pub fn new() -> Self {
        Self {
            grammar: PythonGrammar::new(),
        }
    }

    pub fn grammar(&self) -> &PythonGrammar {
        &self.grammar
    }

    /// Parse `source` into a syntax tree. Sources the grammar can only
    /// recover from are rejected; nothing downstream reasons about them.
    pub fn parse(&self, source: &str) -> Result<Tree> {
        let mut parser = self
            .grammar
            .create_parser()
            .ok_or_else(|| RemedyError::Parse("Python grammar unavailable".to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| RemedyError::Parse("Failed to parse source".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let location = first_error(root)
                .map(|node| {
                    let pos = node.start_position();
                    format!("line {}, column {}", pos.row + 1, pos.column + 1)
                })
                .unwrap_or_else(|| "unknown location".to_string());
            return Err(RemedyError::Parse(format!(
                "malformed Python source near {}",
                location
            )));
        }

        debug!(bytes = source.len(), "parsed Python source");
        Ok(tree)
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_module() {
        let parser = PythonParser::new();
        let tree = parser.parse("def f(n):\n    return n\n").unwrap();
        assert_eq!(tree.root_node().kind(), "module");
    }

    #[test]
    fn rejects_malformed_module() {
        let parser = PythonParser::new();
        let err = parser.parse("def f(n:\n    return (n\n").unwrap_err();
        assert!(matches!(err, RemedyError::Parse(_)));
        assert!(err.to_string().contains("line"));
    }
}
