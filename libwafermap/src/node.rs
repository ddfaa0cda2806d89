use std::collections::BTreeMap;

/// A nested mapping of instrument metadata, ready to be mirrored into an HDF5 group
pub type Tree = BTreeMap<String, Node>;

/// One value of a [`Tree`].
///
/// Groups become HDF5 groups, everything else becomes a dataset of the matching type.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Float(f64),
    Text(String),
    Floats(Vec<f64>),
    Texts(Vec<String>),
    Group(Tree),
}

impl Node {
    /// Instrument headers are untyped; keep anything that reads as a float as a float
    pub fn coerce(value: &str) -> Self {
        match value.trim().parse::<f64>() {
            Ok(v) => Self::Float(v),
            Err(_) => Self::Text(value.to_string()),
        }
    }

    pub fn as_group(&self) -> Option<&Tree> {
        match self {
            Self::Group(tree) => Some(tree),
            _ => None,
        }
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<f64>> for Node {
    fn from(value: Vec<f64>) -> Self {
        Self::Floats(value)
    }
}

impl From<Vec<String>> for Node {
    fn from(value: Vec<String>) -> Self {
        Self::Texts(value)
    }
}

impl From<Tree> for Node {
    fn from(value: Tree) -> Self {
        Self::Group(value)
    }
}

/// Build a tree of text leaves from a flat header map
pub fn text_tree(map: &BTreeMap<String, String>) -> Tree {
    map.iter()
        .map(|(key, value)| (key.clone(), Node::Text(value.clone())))
        .collect()
}
