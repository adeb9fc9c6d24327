use crate::{AstNode, AstValue, Children, RawTranspiler, Transpiler};
use serde_json::json;
use std::collections::HashMap;

fn transpiler_for(value: serde_json::Value) -> Transpiler {
    let raw: RawTranspiler = serde_json::from_value(value).unwrap();
    Transpiler::new(raw).unwrap()
}

fn leaf(tag: &str, text: &str) -> AstNode {
    AstNode::leaf(tag.to_string(), text.to_string(), 1, 1, None)
}

fn leaf_value(tag: &str, text: &str, value: AstValue) -> AstNode {
    AstNode::leaf(tag.to_string(), text.to_string(), 1, 1, Some(value))
}

fn list(tag: &str, children: Vec<AstNode>) -> AstNode {
    AstNode::new(
        tag.to_string(),
        String::new(),
        1,
        1,
        Children::List(children),
    )
}

fn named(tag: &str, entries: Vec<(&str, AstNode)>) -> AstNode {
    let mut map = HashMap::new();
    for (name, node) in entries {
        map.insert(name.to_string(), node);
    }
    AstNode::new(tag.to_string(), String::new(), 1, 1, Children::Named(map))
}

#[test]
fn named_placeholders_substitute_transpiled_children() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "assignment": { "template": "{target} = {value};" }
        }
    }));
    let node = named(
        "assignment",
        vec![("target", leaf("name", "a")), ("value", leaf("number", "1"))],
    );
    assert_eq!(transpiler.transpile(&node).unwrap(), "a = 1;");
}

#[test]
fn children_join_with_the_configured_separator() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "list": { "template": "[{children}]", "join_children_with": ", " }
        }
    }));
    let node = list("list", vec![leaf("n", "1"), leaf("n", "2"), leaf("n", "3")]);
    assert_eq!(transpiler.transpile(&node).unwrap(), "[1, 2, 3]");
}

#[test]
fn children_may_be_indexed_explicitly() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "swap": { "template": "{children.1}{children.0}" }
        }
    }));
    let node = list("swap", vec![leaf("n", "a"), leaf("n", "b")]);
    assert_eq!(transpiler.transpile(&node).unwrap(), "ba");
}

#[test]
fn use_emits_a_node_property_without_recursion() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "number": { "use": "value" },
            "word": { "use": "text" }
        }
    }));
    assert_eq!(
        transpiler
            .transpile(&leaf_value("number", "042", AstValue::Int(42)))
            .unwrap(),
        "42"
    );
    assert_eq!(transpiler.transpile(&leaf("word", "hi")).unwrap(), "hi");
}

#[test]
fn value_emits_a_literal_string() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "separator": { "value": "---" }
        }
    }));
    assert_eq!(transpiler.transpile(&leaf("separator", "x")).unwrap(), "---");
}

#[test]
fn fallback_emits_value_then_text_for_leaves() {
    let transpiler = transpiler_for(json!({ "rules": {} }));
    assert_eq!(
        transpiler
            .transpile(&leaf_value("X", "raw", AstValue::Bool(true)))
            .unwrap(),
        "true"
    );
    assert_eq!(transpiler.transpile(&leaf("X", "raw")).unwrap(), "raw");
    assert_eq!(
        transpiler
            .transpile(&leaf_value("X", "", AstValue::Null))
            .unwrap(),
        "null"
    );
}

#[test]
fn fallback_on_an_interior_node_is_an_error() {
    let transpiler = transpiler_for(json!({ "rules": {} }));
    let err = transpiler
        .transpile(&list("block", vec![leaf("n", "1")]))
        .unwrap_err();
    assert_eq!(err.node_tag, "block");
    assert!(err.message.contains("no transpile rule"));
}

#[test]
fn an_interior_node_with_zero_children_is_not_a_leaf() {
    let transpiler = transpiler_for(json!({ "rules": {} }));
    // A quantifier rule that matched zero repetitions wraps to an empty list;
    // it still needs a rule rather than falling back to its text.
    let err = transpiler.transpile(&list("block", Vec::new())).unwrap_err();
    assert_eq!(err.node_tag, "block");
    assert!(err.message.contains("no transpile rule"));
}

#[test]
fn cases_select_the_first_matching_branch() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "op": {
                "cases": [
                    { "if": { "path": "node.text", "equals": "+" }, "then": "add" },
                    { "if": { "path": "node.text", "equals": "*" }, "then": "mul" },
                    { "default": "unknown" }
                ]
            }
        }
    }));
    assert_eq!(transpiler.transpile(&leaf("op", "+")).unwrap(), "add");
    assert_eq!(transpiler.transpile(&leaf("op", "*")).unwrap(), "mul");
    assert_eq!(transpiler.transpile(&leaf("op", "?")).unwrap(), "unknown");
}

#[test]
fn a_case_block_without_a_match_or_default_is_an_error() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "op": {
                "cases": [ { "if": { "path": "node.text", "equals": "+" }, "then": "add" } ]
            }
        }
    }));
    let err = transpiler.transpile(&leaf("op", "?")).unwrap_err();
    assert!(err.message.contains("no case matched"));
}

#[test]
fn existence_checks_treat_absent_and_empty_as_false() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "node": {
                "cases": [
                    { "if": { "path": "node.extra" }, "then": "has extra" },
                    { "default": "no extra" }
                ]
            }
        }
    }));
    let with_extra = named("node", vec![("extra", leaf("w", "x"))]);
    let without = named("node", vec![("other", leaf("w", "x"))]);
    let empty_text = named("node", vec![("extra", leaf("w", ""))]);
    assert_eq!(transpiler.transpile(&with_extra).unwrap(), "has extra");
    assert_eq!(transpiler.transpile(&without).unwrap(), "no extra");
    assert_eq!(transpiler.transpile(&empty_text).unwrap(), "no extra");
}

#[test]
fn negate_inverts_a_condition() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "node": {
                "cases": [
                    { "if": { "path": "node.text", "equals": "x", "negate": true }, "then": "not x" },
                    { "default": "x" }
                ]
            }
        }
    }));
    assert_eq!(transpiler.transpile(&leaf("node", "y")).unwrap(), "not x");
    assert_eq!(transpiler.transpile(&leaf("node", "x")).unwrap(), "x");
}

#[test]
fn condition_paths_may_reach_into_children() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "call": {
                "cases": [
                    { "if": { "path": "node.callee.text", "equals": "print" }, "then": "console.log({argument})" },
                    { "default": "{callee}({argument})" }
                ]
            }
        }
    }));
    let print_call = named(
        "call",
        vec![("callee", leaf("name", "print")), ("argument", leaf("n", "1"))],
    );
    let other_call = named(
        "call",
        vec![("callee", leaf("name", "f")), ("argument", leaf("n", "2"))],
    );
    assert_eq!(
        transpiler.transpile(&print_call).unwrap(),
        "console.log(1)"
    );
    assert_eq!(transpiler.transpile(&other_call).unwrap(), "f(2)");
}

#[test]
fn state_set_runs_after_output_in_traversal_order() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "statements": { "template": "{children}", "join_children_with": "\n" },
            "assignment": {
                "cases": [
                    { "if": { "path": "state.vars.{target}", "negate": true },
                      "then": "let {target} = {value};" },
                    { "default": "{target} = {value};" }
                ],
                "state_set": { "vars.{target}": true }
            }
        }
    }));
    let program = list(
        "statements",
        vec![
            named(
                "assignment",
                vec![("target", leaf("name", "a")), ("value", leaf("n", "1"))],
            ),
            named(
                "assignment",
                vec![("target", leaf("name", "a")), ("value", leaf("n", "2"))],
            ),
        ],
    );
    assert_eq!(
        transpiler.transpile(&program).unwrap(),
        "let a = 1;\na = 2;"
    );
}

#[test]
fn state_is_fresh_for_every_transpile_call() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "assignment": {
                "cases": [
                    { "if": { "path": "state.vars.{target}", "negate": true },
                      "then": "let {target} = {value};" },
                    { "default": "{target} = {value};" }
                ],
                "state_set": { "vars.{target}": true }
            }
        }
    }));
    let node = named(
        "assignment",
        vec![("target", leaf("name", "a")), ("value", leaf("n", "1"))],
    );
    assert_eq!(transpiler.transpile(&node).unwrap(), "let a = 1;");
    assert_eq!(transpiler.transpile(&node).unwrap(), "let a = 1;");
}

#[test]
fn indented_blocks_nest_without_double_indentation() {
    let transpiler = transpiler_for(json!({
        "rules": {
            "function": { "template": "def {name}({params}):\n{body}" },
            "params": { "template": "{children}", "join_children_with": ", " },
            "statements": { "template": "{children}", "join_children_with": "\n", "indent": true },
            "assignment": { "template": "{target} = {value}" },
            "for_loop": { "template": "for {var} in range({count}):\n{body}" },
            "return_statement": { "template": "return {value}" }
        }
    }));

    let body = list(
        "statements",
        vec![
            named(
                "assignment",
                vec![("target", leaf("name", "a")), ("value", leaf("n", "0"))],
            ),
            named(
                "for_loop",
                vec![
                    ("var", leaf("name", "i")),
                    ("count", leaf("name", "y")),
                    (
                        "body",
                        list(
                            "statements",
                            vec![named(
                                "assignment",
                                vec![
                                    ("target", leaf("name", "a")),
                                    ("value", leaf("expr", "a + x")),
                                ],
                            )],
                        ),
                    ),
                ],
            ),
            named("return_statement", vec![("value", leaf("name", "a"))]),
        ],
    );
    let function = named(
        "function",
        vec![
            ("name", leaf("name", "f")),
            ("params", list("params", vec![leaf("name", "x"), leaf("name", "y")])),
            ("body", body),
        ],
    );

    let expected = "def f(x, y):\n    a = 0\n    for i in range(y):\n        a = a + x\n    return a";
    assert_eq!(transpiler.transpile(&function).unwrap(), expected);
}

#[test]
fn the_indent_unit_is_configurable() {
    let transpiler = transpiler_for(json!({
        "transpiler": { "indent": "  " },
        "rules": {
            "block": { "template": "{children}", "join_children_with": "\n", "indent": true }
        }
    }));
    let node = list("block", vec![leaf("w", "a"), leaf("w", "b")]);
    assert_eq!(transpiler.transpile(&node).unwrap(), "  a\n  b");
}

#[test]
fn children_placeholder_is_forbidden_on_named_children() {
    let transpiler = transpiler_for(json!({
        "rules": { "node": { "template": "{children}" } }
    }));
    let err = transpiler
        .transpile(&named("node", vec![("x", leaf("w", "a"))]))
        .unwrap_err();
    assert!(err.message.contains("named children"));
}

#[test]
fn an_unresolved_placeholder_is_an_error() {
    let transpiler = transpiler_for(json!({
        "rules": { "node": { "template": "{missing}" } }
    }));
    let err = transpiler
        .transpile(&named("node", vec![("x", leaf("w", "a"))]))
        .unwrap_err();
    assert!(err.message.contains("unresolved placeholder"));
}

#[test]
fn use_value_without_a_value_is_an_error() {
    let transpiler = transpiler_for(json!({
        "rules": { "word": { "use": "value" } }
    }));
    let err = transpiler.transpile(&leaf("word", "x")).unwrap_err();
    assert!(err.message.contains("without a value"));
}

#[test]
fn bad_rule_shapes_are_rejected_at_construction() {
    let raw: RawTranspiler = serde_json::from_value(json!({
        "rules": { "word": { "use": "length" } }
    }))
    .unwrap();
    assert!(Transpiler::new(raw).is_err());

    let raw: RawTranspiler = serde_json::from_value(json!({
        "rules": { "word": { "cases": [ { "then": "x" } ] } }
    }))
    .unwrap();
    assert!(Transpiler::new(raw).is_err());

    let raw: RawTranspiler = serde_json::from_value(json!({
        "rules": { "word": { "template": "{unterminated" } }
    }))
    .unwrap();
    assert!(Transpiler::new(raw).is_err());
}
