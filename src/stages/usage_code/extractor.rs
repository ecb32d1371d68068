//! Finds JSX call sites of one component with tree-sitter.

use super::UsageTarget;
use crate::Result;
use crate::model::AttributeValue;
use ohno::app_err;
use std::collections::{BTreeMap, HashSet};
use tree_sitter::{Node, Parser, Tree};

const LOG_TARGET: &str = "usage-code";

/// One JSX element rendering the tracked component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// 1-based line of the opening tag.
    pub line: usize,
    pub uses_elements: bool,
    pub spreads_props: bool,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Parses source files and reports where the target component is rendered.
///
/// A call site only counts when the element name is a local binding of the component
/// imported from the target package, either as a named import (possibly renamed) or as
/// the default export of the component's own module.
pub struct UsageExtractor {
    target: UsageTarget,
    tsx: Parser,
    typescript: Parser,
}

impl core::fmt::Debug for UsageExtractor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UsageExtractor").field("target", &self.target).finish_non_exhaustive()
    }
}

impl UsageExtractor {
    pub fn new(target: UsageTarget) -> Result<Self> {
        let mut tsx = Parser::new();
        tsx.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
            .map_err(|e| app_err!("unable to load the TSX grammar: {e}"))?;

        let mut typescript = Parser::new();
        typescript
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|e| app_err!("unable to load the TypeScript grammar: {e}"))?;

        Ok(Self { target, tsx, typescript })
    }

    #[must_use]
    pub const fn target(&self) -> &UsageTarget {
        &self.target
    }

    /// Extract the call sites in `source`, or `None` when the file could not be parsed at all.
    pub fn extract(&mut self, file_name: &str, source: &str) -> Option<Vec<CallSite>> {
        let parser = if file_name.ends_with(".ts") {
            &mut self.typescript
        } else {
            &mut self.tsx
        };

        let tree = parser.parse(source, None)?;
        Some(self.call_sites(file_name, &tree, source.as_bytes()))
    }

    fn call_sites(&self, file_name: &str, tree: &Tree, source: &[u8]) -> Vec<CallSite> {
        let root = tree.root_node();
        if root.has_error() {
            log::debug!(target: LOG_TARGET, "'{file_name}' has syntax errors, extracting what parsed");
        }

        let bindings = self.bindings(root, source);
        if bindings.is_empty() {
            return Vec::new();
        }

        let mut sites = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if matches!(node.kind(), "jsx_opening_element" | "jsx_self_closing_element")
                && node
                    .child_by_field_name("name")
                    .and_then(|name| name.utf8_text(source).ok())
                    .is_some_and(|name| bindings.contains(name))
            {
                sites.push(call_site(node, source));
            }

            // Reverse so the stack pops children in document order.
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }

        sites
    }

    /// Local names under which the target component is imported.
    fn bindings<'s>(&self, root: Node<'_>, source: &'s [u8]) -> HashSet<&'s str> {
        let component_module = format!("{}/{}", self.target.package, self.target.component);
        let mut bindings = HashSet::new();

        let mut cursor = root.walk();
        for statement in root.named_children(&mut cursor) {
            if statement.kind() != "import_statement" {
                continue;
            }

            let Some(module) = statement
                .child_by_field_name("source")
                .and_then(|s| text(s, source))
                .map(|s| s.trim_matches(|c| c == '"' || c == '\''))
            else {
                continue;
            };

            let from_package = module == self.target.package;
            let from_component_module = module == component_module;
            if !from_package && !from_component_module {
                continue;
            }

            let mut clause_cursor = statement.walk();
            let Some(clause) = statement
                .named_children(&mut clause_cursor)
                .find(|child| child.kind() == "import_clause")
            else {
                continue;
            };

            let mut part_cursor = clause.walk();
            for part in clause.named_children(&mut part_cursor) {
                match part.kind() {
                    "identifier" if from_component_module => {
                        if let Some(local) = text(part, source) {
                            let _ = bindings.insert(local);
                        }
                    }
                    "named_imports" if from_package => {
                        let mut specifier_cursor = part.walk();
                        for specifier in part.named_children(&mut specifier_cursor) {
                            let imported = specifier.child_by_field_name("name").and_then(|n| text(n, source));
                            if imported != Some(self.target.component.as_str()) {
                                continue;
                            }

                            let local = specifier
                                .child_by_field_name("alias")
                                .and_then(|n| text(n, source))
                                .or(imported);
                            if let Some(local) = local {
                                let _ = bindings.insert(local);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        bindings
    }
}

fn text<'s>(node: Node<'_>, source: &'s [u8]) -> Option<&'s str> {
    node.utf8_text(source).ok()
}

fn call_site(tag: Node<'_>, source: &[u8]) -> CallSite {
    let mut spreads_props = false;
    let mut attributes = BTreeMap::new();

    let mut cursor = tag.walk();
    for child in tag.named_children(&mut cursor) {
        match child.kind() {
            "jsx_attribute" => {
                let Some(name) = child.named_child(0).and_then(|n| text(n, source)) else {
                    continue;
                };
                let value = child
                    .named_child(1)
                    .and_then(|v| text(v, source))
                    .map_or(AttributeValue::Shorthand(true), |v| AttributeValue::Source(v.to_string()));
                let _ = attributes.insert(name.to_string(), value);
            }
            "jsx_expression" if has_spread(child) => spreads_props = true,
            _ => {}
        }
    }

    let uses_elements = tag.kind() == "jsx_opening_element" && tag.parent().is_some_and(has_element_children);

    CallSite {
        line: tag.start_position().row + 1,
        uses_elements,
        spreads_props,
        attributes,
    }
}

fn has_spread(expression: Node<'_>) -> bool {
    let mut cursor = expression.walk();
    expression
        .named_children(&mut cursor)
        .any(|child| child.kind() == "spread_element")
}

/// Whether a `jsx_element` has a child element, fragment, or non-empty expression.
fn has_element_children(element: Node<'_>) -> bool {
    let mut cursor = element.walk();
    element.named_children(&mut cursor).any(|child| match child.kind() {
        "jsx_element" | "jsx_self_closing_element" => true,
        "jsx_expression" => {
            let mut inner = child.walk();
            child.named_children(&mut inner).any(|n| n.kind() != "comment")
        }
        _ => false,
    })
}
