// ABOUTME: Shared helpers over tree-sitter nodes and raw source lines
// ABOUTME: Span arithmetic lives here so detector and synthesizer agree on it

use remedy_core::Span;
use tree_sitter::Node;

/// Extract text from a tree-sitter Node
#[inline]
pub fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
    node.utf8_text(content.as_bytes()).unwrap_or("")
}

/// Find first child of a specific kind
pub fn child_by_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|child| child.kind() == kind);
    found
}

/// Named children, skipping comments
pub fn named_children<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Byte offset of the first character of the line containing `offset`.
pub fn line_start(content: &str, offset: usize) -> usize {
    let offset = offset.min(content.len());
    content.as_bytes()[..offset]
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|idx| idx + 1)
        .unwrap_or(0)
}

/// Byte offset just past the line that `end` closes: after its newline,
/// or end of input. `end` is an exclusive node end.
pub fn line_end(content: &str, end: usize) -> usize {
    let end = end.min(content.len());
    if end > 0 && content.as_bytes()[end - 1] == b'\n' {
        return end;
    }
    content.as_bytes()[end..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|idx| end + idx + 1)
        .unwrap_or(content.len())
}

/// 1-based line number of `offset`.
pub fn line_number(content: &str, offset: usize) -> u32 {
    let offset = offset.min(content.len());
    content.as_bytes()[..offset]
        .iter()
        .filter(|b| **b == b'\n')
        .count() as u32
        + 1
}

/// Whole-line span of a top-level definition: from the line of `outer`
/// (decorators included) through the line holding the last statement of
/// `definition`'s body.
pub fn definition_span(content: &str, outer: &Node, definition: &Node) -> Span {
    let start = line_start(content, outer.start_byte());
    let last_statement = definition
        .child_by_field_name("body")
        .and_then(|body| named_children(&body).into_iter().last())
        .filter(|stmt| !stmt.is_missing() && stmt.end_byte() > stmt.start_byte());

    let end = match last_statement {
        Some(stmt) => line_end(content, stmt.end_byte()),
        None => scan_definition_end(content, start),
    };
    Span::new(start, end)
}

/// Line-based end of a top-level definition starting at `start`, used when
/// the tree carries no usable range. Stops before the next top-level
/// `def`/`class`/decorator line or at end of input, and gives back any
/// trailing blank lines.
pub fn scan_definition_end(content: &str, start: usize) -> usize {
    let mut offset = start;
    while offset < content.len() && content[offset..].starts_with('@') {
        offset = line_end(content, offset + 1);
    }
    // the `def` line itself
    offset = line_end(content, offset + 1);
    let mut last_code_end = offset;

    while offset < content.len() {
        let next = line_end(content, offset + 1);
        let line = &content[offset..next];
        if starts_top_level_definition(line) {
            break;
        }
        if !line.trim().is_empty() {
            last_code_end = next;
        }
        offset = next;
    }

    last_code_end
}

fn starts_top_level_definition(line: &str) -> bool {
    line.starts_with("def ")
        || line.starts_with("async def ")
        || line.starts_with("class ")
        || line.starts_with('@')
}

/// Leading whitespace of the line containing `offset`.
pub fn indentation_at<'a>(content: &'a str, offset: usize) -> &'a str {
    let start = line_start(content, offset);
    let line = &content[start..];
    let width = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..width]
}
