//! An arithmetic expression grammar with the usual precedence ladder
//! (`^` binds tightest and associates right, then `*`/`/`, then `+`/`-`),
//! paired with a transpiler that renders expressions as LISP-style calls.

use crate::{RawGrammar, RawTranspiler};
use serde_json::json;

pub fn calculator_grammar() -> RawGrammar {
    serde_json::from_value(json!({
        "start_rule": "expression",
        "rules": {
            "expression": {
                "sequence": [
                    { "rule": "ws" },
                    { "rule": "additive" },
                    { "rule": "ws" }
                ],
                "ast": { "promote": true }
            },
            "ws": { "regex": "[ \\t]*", "ast": { "discard": true } },
            "additive": {
                "sequence": [
                    { "rule": "multiplicative" },
                    { "zero_or_more": {
                        "sequence": [
                            { "rule": "ws" },
                            { "regex": "[+-]", "ast": { "tag": "op", "leaf": true } },
                            { "rule": "ws" },
                            { "rule": "multiplicative" }
                        ]
                    } }
                ],
                "ast": { "structure": "left_associative_op" }
            },
            "multiplicative": {
                "sequence": [
                    { "rule": "power" },
                    { "zero_or_more": {
                        "sequence": [
                            { "rule": "ws" },
                            { "regex": "[*/]", "ast": { "tag": "op", "leaf": true } },
                            { "rule": "ws" },
                            { "rule": "power" }
                        ]
                    } }
                ],
                "ast": { "structure": "left_associative_op" }
            },
            "power": {
                "sequence": [
                    { "rule": "primary" },
                    { "optional": {
                        "sequence": [
                            { "rule": "ws" },
                            { "regex": "\\^", "ast": { "tag": "op", "leaf": true } },
                            { "rule": "ws" },
                            { "rule": "power" }
                        ]
                    } }
                ],
                "ast": { "structure": "right_associative_op" }
            },
            "primary": {
                "choice": [
                    { "rule": "number" },
                    { "rule": "parenthesized" }
                ],
                "ast": { "promote": true }
            },
            "parenthesized": {
                "sequence": [
                    { "literal": "(", "ast": { "discard": true } },
                    { "rule": "expression" },
                    { "literal": ")", "ast": { "discard": true } }
                ],
                "ast": { "promote": true }
            },
            "number": {
                "regex": "-?\\d+(\\.\\d+)?",
                "ast": { "leaf": true, "type": "number", "tag": "number" }
            }
        }
    }))
    .unwrap()
}

pub fn lisp_transpiler() -> RawTranspiler {
    serde_json::from_value(json!({
        "rules": {
            "binary_op": { "template": "({op} {left} {right})" },
            "op": {
                "cases": [
                    { "if": { "path": "node.text", "equals": "+" }, "then": "add" },
                    { "if": { "path": "node.text", "equals": "-" }, "then": "sub" },
                    { "if": { "path": "node.text", "equals": "*" }, "then": "mul" },
                    { "if": { "path": "node.text", "equals": "/" }, "then": "div" },
                    { "if": { "path": "node.text", "equals": "^" }, "then": "pow" }
                ]
            },
            "number": { "use": "value" }
        }
    }))
    .unwrap()
}
