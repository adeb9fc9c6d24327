use std::collections::HashMap;

/// A value stored in the transpiler's mutable traversal state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(HashMap<String, StateValue>),
}

impl StateValue {
    /// String form used by condition comparisons and existence checks.
    pub fn render(&self) -> String {
        match self {
            StateValue::Bool(b) => b.to_string(),
            StateValue::Int(n) => n.to_string(),
            StateValue::Float(n) => n.to_string(),
            StateValue::Str(s) => s.clone(),
            StateValue::Map(_) => "map".to_string(),
        }
    }
}

/// A nested mutable map threaded through the transpiler walk, plus the current
/// indentation depth. Created once per top-level transpile call.
pub struct TranspileState {
    root: HashMap<String, StateValue>,
    pub depth: usize,
}

impl Default for TranspileState {
    fn default() -> Self {
        Self::new()
    }
}

impl TranspileState {
    pub fn new() -> Self {
        Self {
            root: HashMap::new(),
            depth: 0,
        }
    }

    /// Read the value at a path of dot segments. Missing intermediates yield `None`.
    pub fn get(&self, path: &[&str]) -> Option<&StateValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root.get(*first)?;
        for segment in rest {
            match current {
                StateValue::Map(map) => current = map.get(*segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Write a value at a path, creating intermediate maps on demand. A non-map
    /// intermediate is replaced by a map.
    pub fn set(&mut self, path: &[String], value: StateValue) {
        let Some((last, init)) = path.split_last() else {
            return;
        };
        let mut map = &mut self.root;
        for segment in init {
            let entry = map
                .entry(segment.clone())
                .or_insert_with(|| StateValue::Map(HashMap::new()));
            if !matches!(entry, StateValue::Map(_)) {
                *entry = StateValue::Map(HashMap::new());
            }
            match entry {
                StateValue::Map(inner) => map = inner,
                _ => return,
            }
        }
        map.insert(last.clone(), value);
    }
}
