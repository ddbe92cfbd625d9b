// ABOUTME: Finds the self-recursive top-level function most likely to cause latency
// ABOUTME: Classifies it as doubling recursion (p-1 and p-2 self-calls) or generic recursion

use crate::ast_utils::{definition_span, line_number, named_children, node_text};
use crate::PythonParser;
use remedy_core::{Hotspot, HotspotKind, Result};
use tracing::debug;
use tree_sitter::Node;

/// A top-level `def`, with its decorator wrapper when it has one.
#[derive(Debug, Clone, Copy)]
pub struct TopLevelFunction<'tree> {
    /// `decorated_definition` or `function_definition`; spans from this node.
    pub outer: Node<'tree>,
    pub definition: Node<'tree>,
}

impl<'tree> TopLevelFunction<'tree> {
    pub fn name<'a>(&self, content: &'a str) -> Option<&'a str> {
        self.definition
            .child_by_field_name("name")
            .map(|name| node_text(&name, content))
    }

    pub fn decorators(&self) -> Vec<Node<'tree>> {
        if self.outer.kind() != "decorated_definition" {
            return Vec::new();
        }
        let mut cursor = self.outer.walk();
        self.outer
            .children(&mut cursor)
            .filter(|child| child.kind() == "decorator")
            .collect()
    }
}

/// Top-level function definitions of a module in source order.
pub fn top_level_functions(root: Node) -> Vec<TopLevelFunction> {
    let mut functions = Vec::new();
    for child in named_children(&root) {
        match child.kind() {
            "function_definition" => functions.push(TopLevelFunction {
                outer: child,
                definition: child,
            }),
            "decorated_definition" => {
                if let Some(definition) = child
                    .child_by_field_name("definition")
                    .filter(|def| def.kind() == "function_definition")
                {
                    functions.push(TopLevelFunction {
                        outer: child,
                        definition,
                    });
                }
            }
            _ => {}
        }
    }
    functions
}

/// A self-call whose single argument reads `identifier - integer`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OffsetCall {
    identifier: String,
    offset: i64,
}

pub struct HotspotDetector {
    parser: PythonParser,
}

impl HotspotDetector {
    pub fn new() -> Self {
        Self {
            parser: PythonParser::new(),
        }
    }

    pub fn parser(&self) -> &PythonParser {
        &self.parser
    }

    /// The highest-priority hotspot in `source`, if any function recurses.
    pub fn detect(&self, source: &str) -> Result<Option<Hotspot>> {
        Ok(self.candidates(source)?.into_iter().next())
    }

    /// Every self-recursive top-level function, ordered by score descending
    /// then by span start.
    pub fn candidates(&self, source: &str) -> Result<Vec<Hotspot>> {
        let tree = self.parser.parse(source)?;
        let mut hotspots: Vec<Hotspot> = top_level_functions(tree.root_node())
            .into_iter()
            .filter_map(|function| classify(&function, source))
            .collect();

        hotspots.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.span.start_byte.cmp(&b.span.start_byte))
        });
        Ok(hotspots)
    }
}

impl Default for HotspotDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(function: &TopLevelFunction, source: &str) -> Option<Hotspot> {
    let name = function.name(source)?;
    let body = function.definition.child_by_field_name("body")?;

    let mut self_calls = Vec::new();
    collect_self_calls(body, name, source, &mut self_calls);
    if self_calls.is_empty() {
        return None;
    }

    let offsets: Vec<OffsetCall> = self_calls
        .iter()
        .filter_map(|call| offset_argument(*call, source))
        .collect();

    let span = definition_span(source, &function.outer, &function.definition);
    let line = line_number(source, span.start_byte);

    let hotspot = match doubling_parameter(&offsets) {
        Some(parameter) => Hotspot::new(
            HotspotKind::DoublingRecursion,
            name,
            Some(parameter),
            span,
            line,
        ),
        None => Hotspot::new(HotspotKind::GenericRecursion, name, None, span, line),
    };

    debug!(
        function = %hotspot.function_name,
        kind = %hotspot.kind,
        self_calls = self_calls.len(),
        "recursive candidate"
    );
    Some(hotspot)
}

/// Calls anywhere below `node` whose callee is the bare identifier `name`.
fn collect_self_calls<'tree>(
    node: Node<'tree>,
    name: &str,
    source: &str,
    out: &mut Vec<Node<'tree>>,
) {
    if node.kind() == "call" {
        if let Some(callee) = node.child_by_field_name("function") {
            if callee.kind() == "identifier" && node_text(&callee, source) == name {
                out.push(node);
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_self_calls(child, name, source, out);
    }
}

fn offset_argument(call: Node, source: &str) -> Option<OffsetCall> {
    let arguments = call.child_by_field_name("arguments")?;
    if arguments.kind() != "argument_list" {
        return None;
    }
    let args = named_children(&arguments);
    let [arg] = args.as_slice() else {
        return None;
    };
    if arg.kind() != "binary_operator" {
        return None;
    }

    let operator = arg.child_by_field_name("operator")?;
    let left = arg.child_by_field_name("left")?;
    let right = arg.child_by_field_name("right")?;
    if node_text(&operator, source) != "-"
        || left.kind() != "identifier"
        || right.kind() != "integer"
    {
        return None;
    }

    let offset = node_text(&right, source).replace('_', "").parse::<i64>().ok()?;
    if offset != 1 && offset != 2 {
        return None;
    }

    Some(OffsetCall {
        identifier: node_text(&left, source).to_string(),
        offset,
    })
}

/// The first identifier, in call order, seen with both offset 1 and offset 2.
fn doubling_parameter(offsets: &[OffsetCall]) -> Option<String> {
    offsets
        .iter()
        .find(|call| {
            offsets
                .iter()
                .any(|other| other.identifier == call.identifier && other.offset != call.offset)
        })
        .map(|call| call.identifier.clone())
}
