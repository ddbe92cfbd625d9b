// ABOUTME: Turns a classified hotspot into replacement source text
// ABOUTME: Doubling recursion becomes an iterative loop; other recursion gets an lru_cache wrapper

use crate::applier::{apply_span, insert_at};
use crate::ast_utils::{
    child_by_kind, definition_span, indentation_at, line_end, line_start, named_children,
    node_text,
};
use crate::detector::{top_level_functions, TopLevelFunction};
use crate::recurrence::DoublingRecurrence;
use crate::PythonParser;
use remedy_core::{Hotspot, HotspotKind, ImportEdit, Patch, RemedyError, Result, Span};
use tracing::debug;
use tree_sitter::Node;

pub const MEMO_DECORATOR: &str = "@lru_cache(maxsize=None)";
pub const MEMO_IMPORT: &str = "from functools import lru_cache";

const MEMO_DECORATOR_NAMES: &[&str] = &["lru_cache", "functools.lru_cache", "cache", "functools.cache"];
const DEFAULT_INDENT: &str = "    ";

/// A synthesized patch together with the full patched source.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub patch: Patch,
    pub text: String,
}

impl Synthesis {
    pub fn changed(&self) -> bool {
        self.patch.changed
    }
}

pub struct PatchSynthesizer {
    parser: PythonParser,
    recurrence: DoublingRecurrence,
}

impl PatchSynthesizer {
    pub fn new() -> Self {
        Self::with_recurrence(DoublingRecurrence::ADDITIVE)
    }

    pub fn with_recurrence(recurrence: DoublingRecurrence) -> Self {
        Self {
            parser: PythonParser::new(),
            recurrence,
        }
    }

    pub fn synthesize(&self, source: &str, hotspot: &Hotspot) -> Result<Synthesis> {
        let tree = self.parser.parse(source)?;
        let root = tree.root_node();
        let function = top_level_functions(root)
            .into_iter()
            .find(|function| {
                function.name(source) == Some(hotspot.function_name.as_str())
                    && definition_span(source, &function.outer, &function.definition)
                        == hotspot.span
            })
            .ok_or_else(|| {
                RemedyError::Synthesis(format!(
                    "hotspot `{}` no longer matches the source",
                    hotspot.function_name
                ))
            })?;

        let span = hotspot.span;
        let original = span
            .slice(source)
            .ok_or_else(|| RemedyError::Synthesis("hotspot span out of range".to_string()))?;

        let (replacement, import) = match hotspot.kind {
            HotspotKind::DoublingRecursion => {
                let parameter = hotspot.parameter_name.as_deref().ok_or_else(|| {
                    RemedyError::Synthesis(format!(
                        "doubling hotspot `{}` carries no parameter",
                        hotspot.function_name
                    ))
                })?;
                (self.iterative_rewrite(source, &function, span, parameter)?, None)
            }
            HotspotKind::GenericRecursion => (
                memoized(source, &function, span, original),
                memo_import(source, root, &function, span),
            ),
        };

        let mut text = apply_span(source, span, &replacement)?;
        if let Some(edit) = &import {
            if edit.offset > span.start_byte {
                return Err(RemedyError::Synthesis(
                    "import insertion point falls after the hotspot".to_string(),
                ));
            }
            text = insert_at(&text, edit.offset, &edit.text)?;
        }

        let changed = text != source;
        debug!(
            function = %hotspot.function_name,
            kind = %hotspot.kind,
            changed,
            import = import.is_some(),
            "synthesized patch"
        );

        Ok(Synthesis {
            patch: Patch {
                span,
                original: original.to_string(),
                replacement,
                import,
                changed,
            },
            text,
        })
    }

    /// Same decorators, `def` header and docstring; body replaced by the
    /// recurrence loop.
    fn iterative_rewrite(
        &self,
        source: &str,
        function: &TopLevelFunction,
        span: Span,
        parameter: &str,
    ) -> Result<String> {
        let definition = function.definition;
        if !parameter_names(&definition, source).contains(&parameter) {
            return Err(RemedyError::Synthesis(format!(
                "`{}` is not a parameter of `{}`",
                parameter,
                function.name(source).unwrap_or("?")
            )));
        }

        let body = definition
            .child_by_field_name("body")
            .ok_or_else(|| RemedyError::Synthesis("function has no body".to_string()))?;
        let colon = header_colon(&definition, &body)
            .ok_or_else(|| RemedyError::Synthesis("function header has no colon".to_string()))?;

        let def_start = line_start(source, definition.start_byte());
        let decorators = &source[span.start_byte..def_start];
        let header = &source[def_start..colon.end_byte()];

        let statements = named_children(&body);
        let body_on_own_line = line_start(source, body.start_byte()) > def_start;
        let indent = match statements.first() {
            Some(first) if body_on_own_line => indentation_at(source, first.start_byte()),
            _ => "",
        };
        let indent = if indent.is_empty() { DEFAULT_INDENT } else { indent };

        let docstring = statements
            .first()
            .filter(|first| body_on_own_line && is_docstring(first))
            .map(|first| &source[line_start(source, first.start_byte())..line_end(source, first.end_byte())])
            .unwrap_or("");

        let mut replacement = String::with_capacity(span.len());
        replacement.push_str(decorators);
        replacement.push_str(header);
        replacement.push('\n');
        replacement.push_str(docstring);
        if !docstring.is_empty() && !docstring.ends_with('\n') {
            replacement.push('\n');
        }
        replacement.push_str(&self.recurrence.render_body(parameter, indent));
        Ok(replacement)
    }
}

impl Default for PatchSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Original span with the memo decorator placed directly above the `def`
/// line, unless one is already there.
fn memoized(source: &str, function: &TopLevelFunction, span: Span, original: &str) -> String {
    if function
        .decorators()
        .iter()
        .any(|decorator| is_memo_decorator(decorator, source))
    {
        return original.to_string();
    }

    let def_start = line_start(source, function.definition.start_byte());
    let mut replacement = String::with_capacity(original.len() + MEMO_DECORATOR.len() + 1);
    replacement.push_str(&source[span.start_byte..def_start]);
    replacement.push_str(MEMO_DECORATOR);
    replacement.push('\n');
    replacement.push_str(&source[def_start..span.end_byte]);
    replacement
}

fn is_memo_decorator(decorator: &Node, source: &str) -> bool {
    memo_decorator_target(decorator, source).is_some()
}

/// `functools.lru_cache` for `@functools.lru_cache(maxsize=None)`, when the
/// decorator is one of the memoizing spellings.
fn memo_decorator_target<'a>(decorator: &Node, source: &'a str) -> Option<&'a str> {
    let expression = named_children(decorator).into_iter().next()?;
    let target = if expression.kind() == "call" {
        expression.child_by_field_name("function")?
    } else {
        expression
    };
    let text = node_text(&target, source);
    MEMO_DECORATOR_NAMES.contains(&text).then_some(text)
}

/// Import edit binding the name the function's memo decorator refers to,
/// or `None` when the module already binds it outside `span`. Without an
/// existing memo decorator the binding is `lru_cache`, for the decorator
/// about to be added.
fn memo_import(
    source: &str,
    root: Node,
    function: &TopLevelFunction,
    span: Span,
) -> Option<ImportEdit> {
    let existing = function
        .decorators()
        .iter()
        .find_map(|decorator| memo_decorator_target(decorator, source));

    let (bound, import) = match existing {
        Some(target) if target.starts_with("functools.") => (
            imports_module(root, source, span, "functools"),
            "import functools".to_string(),
        ),
        Some(name) => (
            imports_from_functools(root, source, span, name),
            format!("from functools import {}", name),
        ),
        None => (
            imports_from_functools(root, source, span, "lru_cache"),
            MEMO_IMPORT.to_string(),
        ),
    };
    if bound {
        return None;
    }

    Some(ImportEdit {
        offset: import_insertion_offset(root, source, span.start_byte),
        text: format!("{}\n", import),
    })
}

/// Import statements outside `span`, anywhere in the tree.
fn imports_outside<'tree>(node: Node<'tree>, span: Span, out: &mut Vec<Node<'tree>>) {
    if node.start_byte() >= span.start_byte && node.end_byte() <= span.end_byte {
        return;
    }
    if matches!(node.kind(), "import_statement" | "import_from_statement") {
        out.push(node);
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        imports_outside(child, span, out);
    }
}

/// `from functools import name`, an alias bound to `name`, or `*`.
fn imports_from_functools(root: Node, source: &str, span: Span, name: &str) -> bool {
    let mut statements = Vec::new();
    imports_outside(root, span, &mut statements);

    statements
        .into_iter()
        .filter(|statement| statement.kind() == "import_from_statement")
        .filter(|statement| {
            statement
                .child_by_field_name("module_name")
                .map(|module| node_text(&module, source) == "functools")
                .unwrap_or(false)
        })
        .any(|statement| {
            if child_by_kind(&statement, "wildcard_import").is_some() {
                return true;
            }
            let mut cursor = statement.walk();
            let bound = statement
                .children_by_field_name("name", &mut cursor)
                .any(|imported| bound_name(&imported, source) == name);
            bound
        })
}

/// `import module` without an alias.
fn imports_module(root: Node, source: &str, span: Span, module: &str) -> bool {
    let mut statements = Vec::new();
    imports_outside(root, span, &mut statements);

    statements
        .into_iter()
        .filter(|statement| statement.kind() == "import_statement")
        .any(|statement| {
            let mut cursor = statement.walk();
            let bound = statement
                .children_by_field_name("name", &mut cursor)
                .any(|imported| bound_name(&imported, source) == module);
            bound
        })
}

/// Name an imported item binds in the module namespace.
fn bound_name<'a>(imported: &Node, source: &'a str) -> &'a str {
    match imported.kind() {
        "aliased_import" => imported
            .child_by_field_name("alias")
            .map(|alias| node_text(&alias, source))
            .unwrap_or(""),
        // `import a.b` binds `a`
        _ => node_text(imported, source)
            .split('.')
            .next()
            .unwrap_or_default(),
    }
}

/// After the last top-level import before `limit`; else after a module
/// docstring; else after leading comment lines (shebang, encoding).
fn import_insertion_offset(root: Node, source: &str, limit: usize) -> usize {
    let mut offset = None;
    for (idx, statement) in named_children(&root).into_iter().enumerate() {
        if statement.start_byte() >= limit {
            break;
        }
        match statement.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                offset = Some(line_end(source, statement.end_byte()));
            }
            _ if idx == 0 && is_docstring(&statement) => {
                offset = Some(line_end(source, statement.end_byte()));
            }
            _ => {}
        }
    }

    let offset = offset.unwrap_or_else(|| {
        let mut offset = 0;
        while offset < source.len() && source[offset..].starts_with('#') {
            offset = line_end(source, offset + 1);
        }
        offset
    });
    offset.min(limit)
}

fn is_docstring(statement: &Node) -> bool {
    if statement.kind() != "expression_statement" {
        return false;
    }
    let children = named_children(statement);
    matches!(children.as_slice(), [only] if only.kind() == "string" || only.kind() == "concatenated_string")
}

/// The `:` closing the `def` header.
fn header_colon<'tree>(definition: &Node<'tree>, body: &Node<'tree>) -> Option<Node<'tree>> {
    let mut cursor = definition.walk();
    let colon = definition
        .children(&mut cursor)
        .filter(|child| child.kind() == ":" && child.end_byte() <= body.start_byte())
        .last();
    colon
}

fn parameter_names<'a>(definition: &Node, source: &'a str) -> Vec<&'a str> {
    let Some(parameters) = definition.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(&parameters)
        .into_iter()
        .filter_map(|parameter| match parameter.kind() {
            "identifier" => Some(node_text(&parameter, source)),
            "default_parameter" | "typed_default_parameter" => parameter
                .child_by_field_name("name")
                .map(|name| node_text(&name, source)),
            "typed_parameter" => child_by_kind(&parameter, "identifier")
                .map(|name| node_text(&name, source)),
            _ => None,
        })
        .collect()
}
