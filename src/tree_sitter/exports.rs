//! Export discovery on parsed story files
//!
//! Only top-level statements are inspected. Nothing is evaluated: names come
//! from declarations and export clauses, default-export metadata comes from
//! literal property values of an object literal.

use tree_sitter::{Node, Tree};

use crate::manifest::MetadataValue;

/// What a module exports, as far as can be told statically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleExports {
    /// Named exports in source order.
    pub named: Vec<String>,
    /// Literal properties of the default-exported object literal, if any.
    pub default_properties: Vec<(String, MetadataValue)>,
    pub has_default: bool,
}

pub struct ExportCollector<'a> {
    source: &'a str,
}

impl<'a> ExportCollector<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn collect(&self, tree: &Tree) -> ModuleExports {
        let root = tree.root_node();
        let mut exports = ModuleExports::default();

        for statement in top_level_statements(root) {
            if statement.kind() != "export_statement" {
                continue;
            }
            if is_default_export(&statement) {
                exports.has_default = true;
                if let Some(object) = self.default_object(&statement, root) {
                    exports.default_properties = self.literal_properties(&object);
                }
                continue;
            }
            self.collect_named(&statement, &mut exports.named);
        }

        exports
    }

    fn collect_named(&self, statement: &Node, names: &mut Vec<String>) {
        if let Some(declaration) = statement.child_by_field_name("declaration") {
            match declaration.kind() {
                "lexical_declaration" | "variable_declaration" => {
                    let mut cursor = declaration.walk();
                    for declarator in declaration.named_children(&mut cursor) {
                        if declarator.kind() != "variable_declarator" {
                            continue;
                        }
                        if let Some(pattern) = declarator.child_by_field_name("name") {
                            self.binding_names(&pattern, names);
                        }
                    }
                }
                "function_declaration" | "generator_function_declaration" => {
                    if let Some(name) = self.field_text(&declaration, "name") {
                        names.push(name);
                    }
                }
                _ => {}
            }
        }

        let mut cursor = statement.walk();
        for child in statement.named_children(&mut cursor) {
            match child.kind() {
                "export_clause" => {
                    let mut inner = child.walk();
                    for specifier in child.named_children(&mut inner) {
                        if specifier.kind() != "export_specifier" {
                            continue;
                        }
                        let exported = specifier
                            .child_by_field_name("alias")
                            .or_else(|| specifier.child_by_field_name("name"))
                            .and_then(|n| self.name_text(&n));
                        if let Some(name) = exported {
                            push_unique(names, name);
                        }
                    }
                }
                // export * as ns from "./module"
                "namespace_export" => {
                    let mut inner = child.walk();
                    let name = child
                        .named_children(&mut inner)
                        .next()
                        .and_then(|n| self.name_text(&n));
                    if let Some(name) = name {
                        push_unique(names, name);
                    }
                }
                _ => {}
            }
        }
    }

    /// Every identifier bound by a declarator pattern.
    fn binding_names(&self, pattern: &Node, names: &mut Vec<String>) {
        match pattern.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                if let Some(name) = self.text(pattern) {
                    names.push(name);
                }
            }
            "pair_pattern" => {
                if let Some(value) = pattern.child_by_field_name("value") {
                    self.binding_names(&value, names);
                }
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                if let Some(left) = pattern.child_by_field_name("left") {
                    self.binding_names(&left, names);
                }
            }
            "object_pattern" | "array_pattern" | "rest_pattern" => {
                let mut cursor = pattern.walk();
                for child in pattern.named_children(&mut cursor) {
                    self.binding_names(&child, names);
                }
            }
            _ => {}
        }
    }

    fn default_object<'t>(&self, statement: &Node<'t>, root: Node<'t>) -> Option<Node<'t>> {
        let value = unwrap_expression(statement.child_by_field_name("value")?);
        match value.kind() {
            "object" => Some(value),
            "identifier" => {
                let name = self.text(&value)?;
                self.top_level_object(root, &name)
            }
            _ => None,
        }
    }

    /// `const meta = { ... }; export default meta;`
    fn top_level_object<'t>(&self, root: Node<'t>, name: &str) -> Option<Node<'t>> {
        for statement in top_level_statements(root) {
            let declaration = match statement.kind() {
                "lexical_declaration" | "variable_declaration" => statement,
                "export_statement" => match statement.child_by_field_name("declaration") {
                    Some(d) => d,
                    None => continue,
                },
                _ => continue,
            };
            let mut cursor = declaration.walk();
            for declarator in declaration.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let matches = declarator
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "identifier")
                    .and_then(|n| self.text(&n))
                    .is_some_and(|n| n == name);
                if !matches {
                    continue;
                }
                let value = unwrap_expression(declarator.child_by_field_name("value")?);
                return (value.kind() == "object").then_some(value);
            }
        }
        None
    }

    fn literal_properties(&self, object: &Node) -> Vec<(String, MetadataValue)> {
        let mut properties = Vec::new();
        let mut cursor = object.walk();
        for pair in object.named_children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }
            let key = pair
                .child_by_field_name("key")
                .and_then(|k| self.property_key(&k));
            let value = pair
                .child_by_field_name("value")
                .and_then(|v| self.literal_value(unwrap_expression(v)));
            if let (Some(key), Some(value)) = (key, value) {
                properties.push((key, value));
            }
        }
        properties
    }

    fn property_key(&self, key: &Node) -> Option<String> {
        match key.kind() {
            "property_identifier" | "number" => self.text(key),
            "string" => Some(self.string_contents(key)),
            _ => None,
        }
    }

    fn literal_value(&self, value: Node) -> Option<MetadataValue> {
        match value.kind() {
            "string" => Some(MetadataValue::String(self.string_contents(&value))),
            "template_string" => {
                let mut cursor = value.walk();
                let has_substitution = value
                    .named_children(&mut cursor)
                    .any(|c| c.kind() == "template_substitution");
                if has_substitution {
                    return None;
                }
                Some(MetadataValue::String(self.string_contents(&value)))
            }
            "number" => parse_number(&self.text(&value)?),
            "true" => Some(MetadataValue::Bool(true)),
            "false" => Some(MetadataValue::Bool(false)),
            "unary_expression" => {
                let operator = value.child_by_field_name("operator")?;
                let argument = value.child_by_field_name("argument")?;
                if operator.kind() != "-" || argument.kind() != "number" {
                    return None;
                }
                parse_number(&format!("-{}", self.text(&argument)?))
            }
            _ => None,
        }
    }

    /// Decoded contents of a string or template literal.
    fn string_contents(&self, node: &Node) -> String {
        let mut out = String::new();
        let mut cursor = node.walk();
        for part in node.named_children(&mut cursor) {
            let Some(text) = self.text(&part) else {
                continue;
            };
            match part.kind() {
                "string_fragment" => out.push_str(&text),
                "escape_sequence" => out.push_str(&decode_escape(&text)),
                _ => {}
            }
        }
        out
    }

    /// Exported names may be identifiers or string literals (`export { a as "b" }`).
    fn name_text(&self, node: &Node) -> Option<String> {
        match node.kind() {
            "string" => Some(self.string_contents(node)),
            _ => self.text(node),
        }
    }

    fn field_text(&self, node: &Node, field_name: &str) -> Option<String> {
        node.child_by_field_name(field_name)
            .and_then(|n| self.text(&n))
    }

    fn text(&self, node: &Node) -> Option<String> {
        node.utf8_text(self.source.as_bytes())
            .ok()
            .map(|s| s.to_string())
    }
}

/// Children of the program, looking through top-level `ERROR` nodes so that
/// statements after a syntax error are still seen.
fn top_level_statements(root: Node) -> Vec<Node> {
    let mut statements = Vec::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "ERROR" {
            let mut inner = child.walk();
            statements.extend(child.named_children(&mut inner));
        } else {
            statements.push(child);
        }
    }
    statements
}

fn is_default_export(statement: &Node) -> bool {
    let mut cursor = statement.walk();
    let is_default = statement
        .children(&mut cursor)
        .any(|c| c.kind() == "default");
    is_default
}

/// Look through parentheses and TypeScript `as` / `satisfies` wrappers.
fn unwrap_expression(mut node: Node) -> Node {
    while matches!(
        node.kind(),
        "parenthesized_expression" | "as_expression" | "satisfies_expression"
    ) {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

fn parse_number(text: &str) -> Option<MetadataValue> {
    let cleaned = text.replace('_', "");
    if let Ok(int) = cleaned.parse::<i64>() {
        return Some(MetadataValue::Number(int.into()));
    }
    cleaned
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(MetadataValue::Number)
}

fn decode_escape(sequence: &str) -> String {
    let body = sequence.strip_prefix('\\').unwrap_or(sequence);
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest: String = chars.collect();
    match first {
        'n' => "\n".to_string(),
        't' => "\t".to_string(),
        'r' => "\r".to_string(),
        'b' => "\u{8}".to_string(),
        'f' => "\u{c}".to_string(),
        'v' => "\u{b}".to_string(),
        '0' if rest.is_empty() => "\0".to_string(),
        'x' | 'u' => {
            let hex = rest.trim_start_matches('{').trim_end_matches('}');
            u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        }
        // line continuation
        '\n' | '\r' => String::new(),
        other => format!("{}{}", other, rest),
    }
}
