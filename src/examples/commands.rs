//! A command grammar disambiguating `CLONE a TO b` from `CLONE a` with lookaheads:
//! the two-argument form is guarded by a positive lookahead for the `TO` keyword,
//! the one-argument form by the matching negative lookahead.

use crate::RawGrammar;
use serde_json::json;

pub fn clone_grammar() -> RawGrammar {
    serde_json::from_value(json!({
        "start_rule": "command",
        "rules": {
            "command": {
                "choice": [
                    { "rule": "clone_to_statement" },
                    { "rule": "clone_statement" }
                ],
                "ast": { "promote": true }
            },
            "clone_to_statement": {
                "sequence": [
                    { "positive_lookahead": { "regex": "CLONE\\s+\\S+\\s+TO(\\s|\\Z)" } },
                    { "literal": "CLONE", "ast": { "discard": true } },
                    { "rule": "ws" },
                    { "regex": "\\S+", "ast": { "leaf": true, "tag": "path", "name": "source" } },
                    { "rule": "ws" },
                    { "literal": "TO", "ast": { "discard": true } },
                    { "rule": "ws" },
                    { "regex": "\\S+", "ast": { "leaf": true, "tag": "path", "name": "destination" } }
                ],
                "ast": { "tag": "clone_to" }
            },
            "clone_statement": {
                "sequence": [
                    { "literal": "CLONE", "ast": { "discard": true } },
                    { "rule": "ws" },
                    { "negative_lookahead": { "regex": "\\S+\\s+TO(\\s|\\Z)" } },
                    { "regex": "\\S+", "ast": { "leaf": true, "tag": "path", "name": "source" } }
                ],
                "ast": { "tag": "clone" }
            },
            "ws": { "regex": "\\s+", "ast": { "discard": true } }
        }
    }))
    .unwrap()
}
