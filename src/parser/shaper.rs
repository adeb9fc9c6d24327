//! Shaping of raw recognition results into semantic AST nodes, driven by the
//! part-level and rule-level `ast` directives.
//!
//! Shaping is bottom-up: children arrive already shaped, and the directive of the
//! current part decides whether they are discarded, folded, promoted, wrapped into a
//! tagged node, or spliced into the surrounding collection.

use super::{ProductionError, Shaped};
use crate::grammar::{AstDirective, Structure};
use crate::util::Code;
use crate::{AstNode, AstValue, Children};
use std::collections::HashMap;

/// The source region one derivation covered, in byte pointers.
pub(super) struct Span<'c> {
    pub start_ptr: usize,
    pub end_ptr: usize,
    pub code: &'c Code<'c>,
}

impl<'c> Span<'c> {
    fn text(&self) -> &'c str {
        self.code.slice(self.start_ptr, self.end_ptr)
    }

    fn line_col(&self) -> (usize, usize) {
        let position = self.code.obtain_position(self.start_ptr);
        (position.line, position.column)
    }
}

/// Shape a matched terminal (literal, regex or token) into at most one leaf.
pub(super) fn apply_terminal(
    directive: &AstDirective,
    default_tag: Option<&str>,
    span: &Span,
    token_value: Option<AstValue>,
) -> Result<Vec<Shaped>, ProductionError> {
    if directive.discard {
        return Ok(Vec::new());
    }
    let (line, col) = span.line_col();
    let text = span.text().to_string();
    let value = match directive.coerce {
        Some(value_type) => Some(coerce_at(value_type, &text, span.start_ptr)?),
        None => token_value,
    };
    let tag = directive
        .tag
        .clone()
        .or_else(|| default_tag.map(str::to_string))
        .unwrap_or_default();
    let node = AstNode::leaf(tag, text, line, col, value);
    Ok(vec![Shaped {
        name: directive.name.clone(),
        node,
    }])
}

/// Shape a sequence, choice or quantifier derivation.
///
/// `default_tag` is the rule name when the part is a rule body; without a tag or
/// name, anonymous composites splice their surviving children into the parent.
/// `from_choice` marks a choice derivation, whose promotion must yield exactly
/// one node even when the winning alternative spliced several children.
pub(super) fn apply_composite(
    directive: &AstDirective,
    default_tag: Option<&str>,
    children: Vec<Shaped>,
    span: &Span,
    from_choice: bool,
) -> Result<Vec<Shaped>, ProductionError> {
    if directive.discard {
        return Ok(Vec::new());
    }
    if directive.leaf {
        let (line, col) = span.line_col();
        let text = span.text().to_string();
        let value = match directive.coerce {
            Some(value_type) => Some(coerce_at(value_type, &text, span.start_ptr)?),
            None => None,
        };
        let tag = directive
            .tag
            .clone()
            .or_else(|| default_tag.map(str::to_string))
            .unwrap_or_default();
        return Ok(vec![Shaped {
            name: directive.name.clone(),
            node: AstNode::leaf(tag, text, line, col, value),
        }]);
    }

    match &directive.structure {
        Some(Structure::LeftAssociativeOp) => {
            let node = fold_left(children, span)?;
            return Ok(vec![finish_structured(directive, node)]);
        }
        Some(Structure::RightAssociativeOp) => {
            let node = fold_right(children, span)?;
            return Ok(vec![finish_structured(directive, node)]);
        }
        Some(Structure::Mapped { .. }) => {
            return Err(ProductionError::Validation(
                span.start_ptr,
                "map_children structure outside a sequence body".to_string(),
            ));
        }
        None => {}
    }

    if directive.promote {
        let mut promoted = children;
        if from_choice && promoted.len() > 1 {
            // The winning alternative spliced several children; a promoted choice
            // still produces a single node, so the survivors are wrapped.
            let tag = directive
                .tag
                .clone()
                .or_else(|| default_tag.map(str::to_string))
                .unwrap_or_default();
            let node = wrap(tag, promoted, span)?;
            return Ok(vec![Shaped {
                name: directive.name.clone(),
                node,
            }]);
        }
        retag(directive, &mut promoted, span)?;
        if promoted.len() == 1 && directive.name.is_some() {
            promoted[0].name = directive.name.clone();
        }
        return Ok(promoted);
    }

    if directive.tag.is_some() || default_tag.is_some() || directive.name.is_some() {
        let tag = directive
            .tag
            .clone()
            .or_else(|| default_tag.map(str::to_string))
            .unwrap_or_default();
        let mut node = wrap(tag, children, span)?;
        if let Some(value_type) = directive.coerce {
            node.value = Some(coerce_at(value_type, &node.text.clone(), span.start_ptr)?);
        }
        return Ok(vec![Shaped {
            name: directive.name.clone(),
            node,
        }]);
    }
    Ok(children)
}

/// Apply the per-occurrence directive of a `rule` reference site to the already
/// shaped result of that rule.
pub(super) fn apply_site(
    directive: &AstDirective,
    children: Vec<Shaped>,
    span: &Span,
) -> Result<Vec<Shaped>, ProductionError> {
    if directive.is_default() {
        return Ok(children);
    }
    if directive.discard {
        return Ok(Vec::new());
    }
    if directive.leaf {
        let (line, col) = span.line_col();
        let text = span.text().to_string();
        let value = match directive.coerce {
            Some(value_type) => Some(coerce_at(value_type, &text, span.start_ptr)?),
            None => None,
        };
        let tag = directive
            .tag
            .clone()
            .or_else(|| children.first().map(|shaped| shaped.node.tag.clone()))
            .unwrap_or_default();
        return Ok(vec![Shaped {
            name: directive.name.clone(),
            node: AstNode::leaf(tag, text, line, col, value),
        }]);
    }

    let mut result = children;
    if directive.promote {
        result = result.into_iter().flat_map(promote_node).collect();
    }
    retag(directive, &mut result, span)?;
    if result.len() == 1 && directive.name.is_some() {
        result[0].name = directive.name.clone();
    }
    Ok(result)
}

/// Replace a node by its shaped children, keeping keyed names. Leaves stay as-is.
fn promote_node(shaped: Shaped) -> Vec<Shaped> {
    match shaped.node.children {
        Children::Leaf => vec![shaped],
        Children::List(list) => list.into_iter().map(Shaped::anonymous).collect(),
        Children::Named(map) => map
            .into_iter()
            .map(|(name, node)| Shaped {
                name: Some(name),
                node,
            })
            .collect(),
    }
}

/// Re-apply `tag` and `type` to an already shaped (typically promoted) result.
fn retag(
    directive: &AstDirective,
    shaped: &mut [Shaped],
    span: &Span,
) -> Result<(), ProductionError> {
    if directive.tag.is_none() && directive.coerce.is_none() {
        return Ok(());
    }
    for item in shaped {
        if let Some(tag) = &directive.tag {
            item.node.tag = tag.clone();
        }
        if let Some(value_type) = directive.coerce {
            item.node.value = Some(coerce_at(value_type, &item.node.text, span.start_ptr)?);
        }
    }
    Ok(())
}

/// Build the default node shape: a tagged node whose children are an ordered list,
/// or a keyed map when any surviving part carried a `name`.
fn wrap(tag: String, children: Vec<Shaped>, span: &Span) -> Result<AstNode, ProductionError> {
    let (line, col) = children
        .first()
        .map(|shaped| (shaped.node.line, shaped.node.col))
        .unwrap_or_else(|| span.line_col());
    let any_named = children.iter().any(|shaped| shaped.name.is_some());
    let collection = if any_named {
        let mut map = HashMap::new();
        for shaped in children {
            let Some(name) = shaped.name else {
                return Err(ProductionError::Validation(
                    span.start_ptr,
                    format!("unnamed part survived shaping in the named sequence '{}'", tag),
                ));
            };
            if map.contains_key(&name) {
                return Err(ProductionError::Validation(
                    span.start_ptr,
                    format!("duplicate child name '{}' in '{}'", name, tag),
                ));
            }
            map.insert(name, shaped.node);
        }
        Children::Named(map)
    } else {
        Children::List(children.into_iter().map(|shaped| shaped.node).collect())
    };
    Ok(AstNode::new(
        tag,
        span.text().to_string(),
        line,
        col,
        collection,
    ))
}

fn finish_structured(directive: &AstDirective, mut node: AstNode) -> Shaped {
    if let Some(tag) = &directive.tag {
        node.tag = tag.clone();
    }
    Shaped {
        name: directive.name.clone(),
        node,
    }
}

/// Fold `[b0, op1, b1, op2, b2, ...]` left-to-right into nested `binary_op` nodes.
fn fold_left(children: Vec<Shaped>, span: &Span) -> Result<AstNode, ProductionError> {
    let mut iter = children.into_iter();
    let Some(first) = iter.next() else {
        return Err(ProductionError::Validation(
            span.start_ptr,
            "operator rule matched no operands".to_string(),
        ));
    };
    let mut acc = first.node;
    while let Some(op) = iter.next() {
        let Some(right) = iter.next() else {
            return Err(ProductionError::Validation(
                span.start_ptr,
                "operator tail is missing its right operand".to_string(),
            ));
        };
        acc = binary_op(op.node, acc, right.node);
    }
    Ok(acc)
}

/// Fold `[b]` or `[b, op, rest]` where `rest` is the already folded self reference.
fn fold_right(children: Vec<Shaped>, span: &Span) -> Result<AstNode, ProductionError> {
    let mut iter = children.into_iter().map(|shaped| shaped.node);
    match (iter.next(), iter.next(), iter.next(), iter.next()) {
        (Some(base), None, _, _) => Ok(base),
        (Some(base), Some(op), Some(right), None) => Ok(binary_op(op, base, right)),
        _ => Err(ProductionError::Validation(
            span.start_ptr,
            "right associative operator rule must shape to one or three children".to_string(),
        )),
    }
}

fn binary_op(op: AstNode, left: AstNode, right: AstNode) -> AstNode {
    let (line, col) = (left.line, left.col);
    let mut map = HashMap::new();
    map.insert("op".to_string(), op);
    map.insert("left".to_string(), left);
    map.insert("right".to_string(), right);
    AstNode::new(
        "binary_op".to_string(),
        String::new(),
        line,
        col,
        Children::Named(map),
    )
}

/// Build the keyed node of a `map_children` structure from per-slot results.
/// Discarded or missing slots are skipped.
pub(super) fn build_mapped(
    directive: &AstDirective,
    tag: &str,
    map_children: &[(String, usize)],
    slots: Vec<Vec<Shaped>>,
    span: &Span,
) -> Result<Shaped, ProductionError> {
    let (line, col) = slots
        .iter()
        .flatten()
        .next()
        .map(|shaped| (shaped.node.line, shaped.node.col))
        .unwrap_or_else(|| span.line_col());
    let mut map = HashMap::new();
    for (key, index) in map_children {
        if let Some(shaped) = slots.get(*index).and_then(|slot| slot.first()) {
            map.insert(key.clone(), shaped.node.clone());
        }
    }
    let tag = directive.tag.clone().unwrap_or_else(|| tag.to_string());
    let node = AstNode::new(
        tag,
        span.text().to_string(),
        line,
        col,
        Children::Named(map),
    );
    Ok(Shaped {
        name: directive.name.clone(),
        node,
    })
}

fn coerce_at(
    value_type: crate::grammar::ValueType,
    text: &str,
    pointer: usize,
) -> Result<AstValue, ProductionError> {
    AstValue::coerce(value_type, text)
        .map_err(|message| ProductionError::Validation(pointer, message))
}
