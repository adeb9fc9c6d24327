use super::{CompiledGrammar, RuleExpr, RulePart, Structure};
use crate::{GrammarError, GrammarErrorKind};
use std::collections::{HashSet, VecDeque};

/// Validate a composed grammar: every reference resolves, every rule is reachable
/// from the start rule, atoms match the grammar's lexing mode, and structure
/// directives sit on bodies of the required shape.
pub(super) fn validate(grammar: &CompiledGrammar) -> Result<(), GrammarError> {
    if !grammar.rules.contains_key(&grammar.start) {
        return Err(GrammarError::in_rule(
            GrammarErrorKind::UnknownRule,
            &grammar.start,
            format!("start rule '{}' is not defined", grammar.start),
        ));
    }

    let token_names: Option<HashSet<&str>> = grammar
        .lexer
        .as_ref()
        .map(|lexer| lexer.token_names().into_iter().collect());

    for (name, part) in &grammar.rules {
        check_atoms(grammar, name, part, token_names.as_ref())?;
        check_structure(name, part)?;
    }

    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    reachable.insert(grammar.start.as_str());
    queue.push_back(grammar.start.as_str());
    while let Some(name) = queue.pop_front() {
        let mut targets = Vec::new();
        collect_refs(&grammar.rules[name], &mut targets);
        for target in targets {
            if reachable.insert(target) {
                queue.push_back(target);
            }
        }
    }
    let mut unreachable: Vec<&String> = grammar
        .rules
        .keys()
        .filter(|name| !reachable.contains(name.as_str()))
        .collect();
    if !unreachable.is_empty() {
        unreachable.sort();
        return Err(GrammarError::in_rule(
            GrammarErrorKind::Unreachable,
            unreachable[0],
            format!(
                "rules not reachable from '{}': {}",
                grammar.start,
                unreachable
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }
    Ok(())
}

fn check_atoms(
    grammar: &CompiledGrammar,
    rule: &str,
    part: &RulePart,
    token_names: Option<&HashSet<&str>>,
) -> Result<(), GrammarError> {
    match &part.expr {
        RuleExpr::Literal(_) | RuleExpr::Regex(_) => {
            if token_names.is_some() {
                return Err(GrammarError::in_rule(
                    GrammarErrorKind::BadStructure,
                    rule,
                    "literal and regex atoms cannot be used when the grammar has a lexer"
                        .to_string(),
                ));
            }
        }
        RuleExpr::Token(name) => match token_names {
            None => {
                return Err(GrammarError::in_rule(
                    GrammarErrorKind::BadStructure,
                    rule,
                    format!("token '{}' requires a lexer block", name),
                ));
            }
            Some(names) => {
                if !names.contains(name.as_str()) {
                    return Err(GrammarError::in_rule(
                        GrammarErrorKind::UnknownRule,
                        rule,
                        format!("unknown token '{}'", name),
                    ));
                }
            }
        },
        RuleExpr::Ref(target) => {
            if !grammar.rules.contains_key(target) {
                return Err(GrammarError::in_rule(
                    GrammarErrorKind::UnknownRule,
                    rule,
                    format!("reference to unknown rule '{}'", target),
                ));
            }
        }
        RuleExpr::Sequence(parts) | RuleExpr::Choice(parts) => {
            for part in parts {
                check_atoms(grammar, rule, part, token_names)?;
            }
        }
        RuleExpr::ZeroOrMore(inner)
        | RuleExpr::OneOrMore(inner)
        | RuleExpr::Optional(inner)
        | RuleExpr::PosLookahead(inner)
        | RuleExpr::NegLookahead(inner) => {
            check_atoms(grammar, rule, inner, token_names)?;
        }
    }
    Ok(())
}

/// Lint structure directives, at the rule level and on nested occurrences.
fn check_structure(rule: &str, part: &RulePart) -> Result<(), GrammarError> {
    if let Some(structure) = &part.ast.structure {
        match structure {
            Structure::LeftAssociativeOp => {
                let parts = sequence_parts(part).ok_or_else(|| bad_op_shape(rule, "left"))?;
                let last = parts.last().ok_or_else(|| bad_op_shape(rule, "left"))?;
                match &last.expr {
                    RuleExpr::ZeroOrMore(tail) if parts.len() >= 2 => match &tail.expr {
                        RuleExpr::Sequence(_) => {}
                        _ => return Err(bad_op_shape(rule, "left")),
                    },
                    _ => return Err(bad_op_shape(rule, "left")),
                }
            }
            Structure::RightAssociativeOp => {
                let parts = sequence_parts(part).ok_or_else(|| bad_op_shape(rule, "right"))?;
                let last = parts.last().ok_or_else(|| bad_op_shape(rule, "right"))?;
                match &last.expr {
                    RuleExpr::Optional(tail) if parts.len() >= 2 => match &tail.expr {
                        RuleExpr::Sequence(_) => {}
                        _ => return Err(bad_op_shape(rule, "right")),
                    },
                    _ => return Err(bad_op_shape(rule, "right")),
                }
            }
            Structure::Mapped { map_children, .. } => {
                let parts = sequence_parts(part).ok_or_else(|| {
                    GrammarError::in_rule(
                        GrammarErrorKind::BadStructure,
                        rule,
                        "map_children requires a sequence body".to_string(),
                    )
                })?;
                for (key, index) in map_children {
                    if *index >= parts.len() {
                        return Err(GrammarError::in_rule(
                            GrammarErrorKind::BadStructure,
                            rule,
                            format!(
                                "map_children index {} for '{}' is out of range for a sequence of {}",
                                index,
                                key,
                                parts.len()
                            ),
                        ));
                    }
                }
            }
        }
    }

    match &part.expr {
        RuleExpr::Sequence(parts) | RuleExpr::Choice(parts) => {
            for part in parts {
                check_structure(rule, part)?;
            }
        }
        RuleExpr::ZeroOrMore(inner)
        | RuleExpr::OneOrMore(inner)
        | RuleExpr::Optional(inner)
        | RuleExpr::PosLookahead(inner)
        | RuleExpr::NegLookahead(inner) => {
            check_structure(rule, inner)?;
        }
        _ => {}
    }
    Ok(())
}

fn sequence_parts(part: &RulePart) -> Option<&[RulePart]> {
    match &part.expr {
        RuleExpr::Sequence(parts) => Some(parts),
        _ => None,
    }
}

fn bad_op_shape(rule: &str, side: &str) -> GrammarError {
    GrammarError::in_rule(
        GrammarErrorKind::BadStructure,
        rule,
        format!(
            "{}_associative_op requires a sequence of a base followed by a {} tail",
            side,
            if side == "left" {
                "zero_or_more"
            } else {
                "optional"
            }
        ),
    )
}

fn collect_refs<'g>(part: &'g RulePart, out: &mut Vec<&'g str>) {
    match &part.expr {
        RuleExpr::Ref(target) => out.push(target),
        RuleExpr::Sequence(parts) | RuleExpr::Choice(parts) => {
            for part in parts {
                collect_refs(part, out);
            }
        }
        RuleExpr::ZeroOrMore(inner)
        | RuleExpr::OneOrMore(inner)
        | RuleExpr::Optional(inner)
        | RuleExpr::PosLookahead(inner)
        | RuleExpr::NegLookahead(inner) => collect_refs(inner, out),
        _ => {}
    }
}
