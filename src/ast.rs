use crate::grammar::ValueType;
use crate::{AstNode, AstValue, Children};
use ptree::TreeItem;
use std::fmt::{Debug, Display, Formatter};

impl AstValue {
    /// Apply a `type` coercion to a matched slice.
    pub(crate) fn coerce(value_type: ValueType, text: &str) -> Result<AstValue, String> {
        match value_type {
            ValueType::Number => {
                if let Ok(int) = text.parse::<i64>() {
                    Ok(AstValue::Int(int))
                } else {
                    text.parse::<f64>()
                        .map(AstValue::Float)
                        .map_err(|_| format!("cannot coerce '{}' to a number", text))
                }
            }
            ValueType::Bool => match text {
                "true" => Ok(AstValue::Bool(true)),
                "false" => Ok(AstValue::Bool(false)),
                _ => Err(format!("cannot coerce '{}' to a bool", text)),
            },
            ValueType::Null => {
                if text == "null" {
                    Ok(AstValue::Null)
                } else {
                    Err(format!("cannot coerce '{}' to null", text))
                }
            }
        }
    }
}

impl Display for AstValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AstValue::Int(n) => write!(f, "{}", n),
            AstValue::Float(n) => write!(f, "{}", n),
            AstValue::Bool(b) => write!(f, "{}", b),
            AstValue::Null => write!(f, "null"),
        }
    }
}

impl Children {
    pub fn is_empty(&self) -> bool {
        match self {
            Children::Leaf => true,
            Children::List(list) => list.is_empty(),
            Children::Named(map) => map.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Children::Leaf => 0,
            Children::List(list) => list.len(),
            Children::Named(map) => map.len(),
        }
    }
}

impl AstNode {
    /// Create a new interior AST node.
    pub fn new(
        tag: String,
        text: String,
        line: usize,
        col: usize,
        children: Children,
    ) -> Self {
        Self {
            tag,
            text,
            line,
            col,
            value: None,
            children,
        }
    }

    /// Create an AST leaf node.
    pub fn leaf(
        tag: String,
        text: String,
        line: usize,
        col: usize,
        value: Option<AstValue>,
    ) -> Self {
        Self {
            tag,
            text,
            line,
            col,
            value,
            children: Children::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// A named child of this node, when the producing sequence carried `name` directives.
    pub fn get(&self, name: &str) -> Option<&AstNode> {
        match &self.children {
            Children::Named(map) => map.get(name),
            _ => None,
        }
    }

    /// The ordered children of this node, empty for leaves and named nodes.
    pub fn list(&self) -> &[AstNode] {
        match &self.children {
            Children::List(list) => list,
            _ => &[],
        }
    }

    /// Find the first node with the given tag, searching through all nested children.
    pub fn find(&self, tag: &str) -> Option<&AstNode> {
        if self.tag == tag {
            Some(self)
        } else {
            self.each_child().find_map(|child| child.find(tag))
        }
    }

    /// Find a nested node following a chain of tags.
    pub fn find_path(&self, tags: &[&str]) -> Option<&AstNode> {
        let mut current: Option<&AstNode> = Some(self);
        for tag in tags {
            current = current.and_then(|node| node.find(tag));
        }
        current
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.find(tag).is_some()
    }

    /// Depth-first walk over this node and all nested children.
    pub fn walk<'this, TF: FnMut(&'this AstNode)>(&'this self, callback: &mut TF) {
        callback(self);
        for child in self.each_child() {
            child.walk(callback);
        }
    }

    fn each_child(&self) -> Box<dyn Iterator<Item = &AstNode> + '_> {
        match &self.children {
            Children::Leaf => Box::new(std::iter::empty()),
            Children::List(list) => Box::new(list.iter()),
            Children::Named(map) => Box::new(map.values()),
        }
    }
}

impl Debug for AstNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug_struct = f.debug_struct("AstNode");
        debug_struct
            .field("tag", &self.tag)
            .field("line", &self.line)
            .field("col", &self.col);
        if let Some(value) = &self.value {
            debug_struct.field("value", value);
        }
        match &self.children {
            Children::Leaf => {
                debug_struct.field("text", &self.text);
            }
            Children::List(list) => {
                debug_struct.field("children", list);
            }
            Children::Named(map) => {
                debug_struct.field("children", map);
            }
        }
        debug_struct.finish()
    }
}

impl TreeItem for AstNode {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        match &self.value {
            Some(value) => write!(f, "{} # {}:{} = {}", self.tag, self.line, self.col, value),
            None if self.is_leaf() => {
                write!(f, "{} # {}:{} '{}'", self.tag, self.line, self.col, self.text)
            }
            None => write!(f, "{} # {}:{}", self.tag, self.line, self.col),
        }
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        match &self.children {
            Children::Leaf => std::borrow::Cow::from(Vec::new()),
            Children::List(list) => std::borrow::Cow::from(list.clone()),
            Children::Named(map) => std::borrow::Cow::from(map.values().cloned().collect::<Vec<_>>()),
        }
    }
}

impl AstNode {
    pub fn print(&self) -> Result<(), std::io::Error> {
        ptree::print_tree(self)
    }
}
