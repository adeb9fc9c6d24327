//! The transpiler engine: a tree walker that renders each AST node into text via a
//! data-driven rule set of templates, conditionals and a mutable traversal state,
//! with automatic indentation management.
//!
//! Rule lookup is by node tag. Within one node's rendering each referenced child is
//! transpiled at most once and the string reused across condition paths, templates
//! and `state_set` paths, so state side effects run once per child in left-to-right
//! reference order.

mod state;

#[cfg(test)]
mod __tests__;

pub use state::{StateValue, TranspileState};

use crate::grammar::raw::{RawCase, RawStateValue, RawTranspileRule, RawTranspiler};
use crate::{AstNode, Children, TranspileError};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_INDENT: &str = "    ";

/// A transpiler holding a compiled rule table, reusable across transpile calls.
pub struct Transpiler {
    rules: HashMap<String, TranspileRule>,
    indent_unit: String,
}

struct TranspileRule {
    template: Option<Template>,
    use_: Option<UseField>,
    value: Option<String>,
    cases: Vec<Case>,
    state_set: Vec<(Template, StateValue)>,
    join: String,
    indent: bool,
}

enum UseField {
    Value,
    Text,
}

struct Case {
    condition: Option<Condition>,
    then: Template,
}

struct Condition {
    path: Template,
    equals: Option<String>,
    negate: bool,
}

/// A template string pre-parsed into literal runs and placeholders.
#[derive(Clone)]
struct Template {
    segments: Vec<Segment>,
}

#[derive(Clone)]
enum Segment {
    Literal(String),
    Children,
    ChildIndex(usize),
    Named(String),
}

impl Template {
    fn parse(text: &str) -> Result<Template, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Err(format!("unterminated placeholder in template '{}'", text));
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let inner = &after[..close];
            if inner == "children" {
                segments.push(Segment::Children);
            } else if let Some(index) = inner.strip_prefix("children.") {
                let index = index
                    .parse::<usize>()
                    .map_err(|_| format!("bad children index '{{{}}}'", inner))?;
                segments.push(Segment::ChildIndex(index));
            } else {
                segments.push(Segment::Named(inner.to_string()));
            }
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Template { segments })
    }
}

impl Transpiler {
    /// Compile a raw transpiler rule set. Template syntax and `use` fields are
    /// checked up front.
    pub fn new(raw: RawTranspiler) -> Result<Self, TranspileError> {
        let indent_unit = raw
            .transpiler
            .and_then(|options| options.indent)
            .unwrap_or_else(|| DEFAULT_INDENT.to_string());
        let mut rules = HashMap::new();
        for (tag, raw_rule) in raw.rules {
            let rule = compile_rule(&tag, raw_rule)?;
            rules.insert(tag, rule);
        }
        Ok(Self { rules, indent_unit })
    }

    /// Load a transpiler rule set from a `.json` or `.toml` file.
    pub fn from_file(path: &Path) -> Result<Self, TranspileError> {
        let raw = RawTranspiler::load_from_file(path)
            .map_err(|err| TranspileError::new("", 0, 0, err.to_string()))?;
        Self::new(raw)
    }

    /// Render an AST into output text. State is created once per call and threaded
    /// through the whole walk.
    pub fn transpile(&self, ast: &AstNode) -> Result<String, TranspileError> {
        let mut state = TranspileState::new();
        self.render_node(ast, &mut state)
    }

    fn render_node(&self, node: &AstNode, state: &mut TranspileState) -> Result<String, TranspileError> {
        match self.rules.get(&node.tag) {
            Some(rule) => self.apply_rule(rule, node, state),
            None => self.fallback(node),
        }
    }

    /// Leaf nodes without a rule emit their coerced value or their matched text;
    /// an interior node without a rule is an error, even when it matched zero
    /// children (its empty list is still not a leaf).
    fn fallback(&self, node: &AstNode) -> Result<String, TranspileError> {
        if !matches!(node.children, Children::Leaf) {
            return Err(TranspileError::new(
                &node.tag,
                node.line,
                node.col,
                format!("no transpile rule for tag '{}'", node.tag),
            ));
        }
        match &node.value {
            Some(value) => Ok(value.to_string()),
            None => Ok(node.text.clone()),
        }
    }

    fn apply_rule(
        &self,
        rule: &TranspileRule,
        node: &AstNode,
        state: &mut TranspileState,
    ) -> Result<String, TranspileError> {
        if rule.indent {
            state.depth += 1;
        }
        let result = self.apply_rule_inner(rule, node, state);
        if rule.indent {
            state.depth -= 1;
        }
        result
    }

    fn apply_rule_inner(
        &self,
        rule: &TranspileRule,
        node: &AstNode,
        state: &mut TranspileState,
    ) -> Result<String, TranspileError> {
        let mut memo: HashMap<String, String> = HashMap::new();

        let output = if !rule.cases.is_empty() {
            let mut selected: Option<&Template> = None;
            for case in &rule.cases {
                let matched = match &case.condition {
                    None => true,
                    Some(condition) => {
                        self.eval_condition(condition, rule, node, state, &mut memo)?
                    }
                };
                if matched {
                    selected = Some(&case.then);
                    break;
                }
            }
            let Some(template) = selected else {
                return Err(TranspileError::new(
                    &node.tag,
                    node.line,
                    node.col,
                    "no case matched and no default branch is present".to_string(),
                ));
            };
            self.render_template(template, rule, node, state, &mut memo, true)?
        } else if let Some(template) = &rule.template {
            self.render_template(template, rule, node, state, &mut memo, true)?
        } else if let Some(use_field) = &rule.use_ {
            match use_field {
                UseField::Value => match &node.value {
                    Some(value) => value.to_string(),
                    None => {
                        return Err(TranspileError::new(
                            &node.tag,
                            node.line,
                            node.col,
                            "'use: value' on a node without a value".to_string(),
                        ));
                    }
                },
                UseField::Text => node.text.clone(),
            }
        } else if let Some(value) = &rule.value {
            value.clone()
        } else {
            self.fallback(node)?
        };

        // State writes happen after the node's output is computed.
        for (path_template, value) in &rule.state_set {
            let path = self.render_template(path_template, rule, node, state, &mut memo, false)?;
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            state.set(&segments, value.clone());
        }
        Ok(output)
    }

    fn render_template(
        &self,
        template: &Template,
        rule: &TranspileRule,
        node: &AstNode,
        state: &mut TranspileState,
        memo: &mut HashMap<String, String>,
        apply_indent: bool,
    ) -> Result<String, TranspileError> {
        let mut out = String::new();
        for segment in &template.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                _ => {
                    let rendered = self.resolve_segment(segment, rule, node, state, memo)?;
                    if apply_indent && rule.indent {
                        out.push_str(&indent_lines(&rendered, &self.indent_unit));
                    } else {
                        out.push_str(&rendered);
                    }
                }
            }
        }
        Ok(out)
    }

    fn resolve_segment(
        &self,
        segment: &Segment,
        rule: &TranspileRule,
        node: &AstNode,
        state: &mut TranspileState,
        memo: &mut HashMap<String, String>,
    ) -> Result<String, TranspileError> {
        match segment {
            Segment::Literal(_) => Ok(String::new()),
            Segment::Children => match &node.children {
                Children::Named(_) => Err(TranspileError::new(
                    &node.tag,
                    node.line,
                    node.col,
                    "'{children}' cannot be used with named children".to_string(),
                )),
                Children::Leaf => Ok(String::new()),
                Children::List(list) => {
                    let mut parts = Vec::with_capacity(list.len());
                    for index in 0..list.len() {
                        parts.push(self.render_list_child(node, index, state, memo)?);
                    }
                    Ok(parts.join(&rule.join))
                }
            },
            Segment::ChildIndex(index) => match &node.children {
                Children::List(list) if *index < list.len() => {
                    self.render_list_child(node, *index, state, memo)
                }
                _ => Err(TranspileError::new(
                    &node.tag,
                    node.line,
                    node.col,
                    format!("no child at index {}", index),
                )),
            },
            Segment::Named(name) => {
                let Some(child) = node.get(name) else {
                    return Err(TranspileError::new(
                        &node.tag,
                        node.line,
                        node.col,
                        format!("unresolved placeholder '{{{}}}'", name),
                    ));
                };
                let key = format!("@{}", name);
                if let Some(rendered) = memo.get(&key) {
                    return Ok(rendered.clone());
                }
                let rendered = self.render_node(child, state)?;
                memo.insert(key, rendered.clone());
                Ok(rendered)
            }
        }
    }

    fn render_list_child(
        &self,
        node: &AstNode,
        index: usize,
        state: &mut TranspileState,
        memo: &mut HashMap<String, String>,
    ) -> Result<String, TranspileError> {
        let key = format!("#{}", index);
        if let Some(rendered) = memo.get(&key) {
            return Ok(rendered.clone());
        }
        let Children::List(list) = &node.children else {
            return Err(TranspileError::new(
                &node.tag,
                node.line,
                node.col,
                "indexed access on non-list children".to_string(),
            ));
        };
        let rendered = self.render_node(&list[index], state)?;
        memo.insert(key, rendered.clone());
        Ok(rendered)
    }

    fn eval_condition(
        &self,
        condition: &Condition,
        rule: &TranspileRule,
        node: &AstNode,
        state: &mut TranspileState,
        memo: &mut HashMap<String, String>,
    ) -> Result<bool, TranspileError> {
        let path = self.render_template(&condition.path, rule, node, state, memo, false)?;
        let segments: Vec<&str> = path.split('.').collect();
        let resolved: Option<String> = match segments.split_first() {
            Some((&"node", rest)) => resolve_node_path(node, rest),
            Some((&"state", rest)) => state.get(rest).map(|value| value.render()),
            _ => {
                return Err(TranspileError::new(
                    &node.tag,
                    node.line,
                    node.col,
                    format!("condition path must be rooted in node. or state.: '{}'", path),
                ));
            }
        };
        let truthy = match (&condition.equals, &resolved) {
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
            (None, Some(actual)) => !actual.is_empty(),
            (None, None) => false,
        };
        Ok(if condition.negate { !truthy } else { truthy })
    }
}

/// Walk a `node.`-rooted condition path. Missing keys yield `None` (absent).
fn resolve_node_path(node: &AstNode, segments: &[&str]) -> Option<String> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(match &node.value {
            Some(value) => value.to_string(),
            None => node.text.clone(),
        });
    };
    match *first {
        "tag" if rest.is_empty() => Some(node.tag.clone()),
        "text" if rest.is_empty() => Some(node.text.clone()),
        "value" if rest.is_empty() => node.value.as_ref().map(|value| value.to_string()),
        "children" => {
            let (key, deeper) = rest.split_first()?;
            let child = match &node.children {
                Children::List(list) => key.parse::<usize>().ok().and_then(|i| list.get(i)),
                Children::Named(map) => map.get(*key),
                Children::Leaf => None,
            }?;
            resolve_node_path(child, deeper)
        }
        name => {
            let child = node.get(name)?;
            resolve_node_path(child, rest)
        }
    }
}

/// Prefix every non-empty line with one indent unit.
fn indent_lines(text: &str, unit: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                line.to_string()
            } else {
                format!("{}{}", unit, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn compile_rule(tag: &str, raw: RawTranspileRule) -> Result<TranspileRule, TranspileError> {
    let bad = |message: String| TranspileError::new(tag, 0, 0, message);

    let template = match &raw.template {
        Some(text) => Some(Template::parse(text).map_err(&bad)?),
        None => None,
    };
    let use_ = match raw.use_.as_deref() {
        None => None,
        Some("value") => Some(UseField::Value),
        Some("text") => Some(UseField::Text),
        Some(other) => {
            return Err(bad(format!("'use' must be 'value' or 'text', found '{}'", other)));
        }
    };
    let cases = match raw.cases {
        None => Vec::new(),
        Some(raw_cases) => {
            let mut cases = Vec::with_capacity(raw_cases.len());
            for raw_case in raw_cases {
                cases.push(compile_case(tag, raw_case)?);
            }
            cases
        }
    };
    let mut state_set: Vec<(Template, StateValue)> = Vec::new();
    if let Some(raw_set) = raw.state_set {
        let mut entries: Vec<(String, RawStateValue)> = raw_set.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (path, value) in entries {
            state_set.push((Template::parse(&path).map_err(&bad)?, convert_state_value(value)));
        }
    }
    Ok(TranspileRule {
        template,
        use_,
        value: raw.value,
        cases,
        state_set,
        join: raw.join_children_with.unwrap_or_default(),
        indent: raw.indent.unwrap_or(false),
    })
}

fn compile_case(tag: &str, raw: RawCase) -> Result<Case, TranspileError> {
    let bad = |message: String| TranspileError::new(tag, 0, 0, message);
    if let Some(default) = raw.default {
        return Ok(Case {
            condition: None,
            then: Template::parse(&default).map_err(&bad)?,
        });
    }
    let condition = raw
        .if_
        .ok_or_else(|| bad("a case needs an 'if' condition or a 'default'".to_string()))?;
    let then = raw
        .then
        .ok_or_else(|| bad("a conditional case needs a 'then' template".to_string()))?;
    Ok(Case {
        condition: Some(Condition {
            path: Template::parse(&condition.path).map_err(&bad)?,
            equals: condition.equals,
            negate: condition.negate.unwrap_or(false),
        }),
        then: Template::parse(&then).map_err(&bad)?,
    })
}

fn convert_state_value(raw: RawStateValue) -> StateValue {
    match raw {
        RawStateValue::Bool(b) => StateValue::Bool(b),
        RawStateValue::Int(n) => StateValue::Int(n),
        RawStateValue::Float(n) => StateValue::Float(n),
        RawStateValue::Str(s) => StateValue::Str(s),
    }
}
