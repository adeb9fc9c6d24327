//! A layout-sensitive, Python-like function grammar driven by the lexer's
//! `handle_indent` action: function bodies are delimited by synthetic
//! `INDENT`/`DEDENT` tokens instead of braces.

use crate::RawGrammar;
use serde_json::json;

pub fn function_grammar() -> RawGrammar {
    serde_json::from_value(json!({
        "start_rule": "module",
        "rules": {
            "module": { "rule": "function", "ast": { "promote": true } },
            "function": {
                "sequence": [
                    { "token": "DEF", "ast": { "discard": true } },
                    { "token": "NAME", "ast": { "leaf": true, "name": "name" } },
                    { "token": "LPAREN", "ast": { "discard": true } },
                    { "token": "RPAREN", "ast": { "discard": true } },
                    { "token": "COLON", "ast": { "discard": true } },
                    { "token": "INDENT", "ast": { "discard": true } },
                    { "rule": "statements", "ast": { "name": "body" } },
                    { "token": "DEDENT", "ast": { "discard": true } }
                ],
                "ast": { "tag": "function" }
            },
            "statements": { "one_or_more": { "rule": "statement" } },
            "statement": {
                "choice": [
                    { "token": "RETURN", "ast": { "leaf": true } }
                ],
                "ast": { "promote": true }
            }
        },
        "lexer": [
            { "regex": "\\n[ \\t]*", "action": "handle_indent", "token": "NEWLINE" },
            { "regex": "[ \\t]+", "action": "skip" },
            { "regex": "def\\b", "token": "DEF" },
            { "regex": "return\\b", "token": "RETURN" },
            { "regex": "[A-Za-z_][A-Za-z0-9_]*", "token": "NAME" },
            { "regex": "\\(", "token": "LPAREN" },
            { "regex": "\\)", "token": "RPAREN" },
            { "regex": ":", "token": "COLON" }
        ]
    }))
    .unwrap()
}
