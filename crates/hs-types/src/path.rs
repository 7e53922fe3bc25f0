//! Addresses of nodes inside a config tree.
//!
//! A [`ParameterPath`] renders as `trainer.optimizer.lr` or
//! `model.layers[2].width`: mapping keys are joined with `.` and sequence
//! indices are appended as `[index]`. The textual form is parsed back by
//! [`ParameterPath::from_str`] when resolving paths during materialization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigNode;
use crate::errors::SpaceError;

/// One step of a path: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// A location in a config tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterPath {
    steps: Vec<PathStep>,
}

impl ParameterPath {
    /// The empty path, addressing the tree root.
    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Extend with a mapping key.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep::Key(key.into()));
        Self { steps }
    }

    /// Extend with a sequence index.
    pub fn index(&self, index: usize) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep::Index(index));
        Self { steps }
    }

    /// Look up the node this path addresses.
    pub fn resolve<'a>(&self, tree: &'a ConfigNode) -> Option<&'a ConfigNode> {
        self.steps.iter().try_fold(tree, |node, step| match step {
            PathStep::Key(k) => node.as_object()?.get(k),
            PathStep::Index(i) => node.as_array()?.get(*i),
        })
    }

    /// Mutable lookup of the node this path addresses.
    pub fn resolve_mut<'a>(&self, tree: &'a mut ConfigNode) -> Option<&'a mut ConfigNode> {
        self.steps.iter().try_fold(tree, |node, step| match step {
            PathStep::Key(k) => node.as_object_mut()?.get_mut(k),
            PathStep::Index(i) => node.as_array_mut()?.get_mut(*i),
        })
    }

    /// Overwrite an existing node. Fails if the path does not exist in the
    /// tree's shape.
    pub fn assign(&self, tree: &mut ConfigNode, value: ConfigNode) -> Result<(), SpaceError> {
        match self.resolve_mut(tree) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SpaceError::Resolution {
                path: self.to_string(),
            }),
        }
    }

    /// Write a node, creating missing mapping levels along the way. Sequence
    /// indices must already exist.
    pub fn upsert(&self, tree: &mut ConfigNode, value: ConfigNode) -> Result<(), SpaceError> {
        let mut node = tree;
        for step in &self.steps {
            node = match step {
                PathStep::Key(k) => {
                    if node.is_null() {
                        *node = ConfigNode::Object(serde_json::Map::new());
                    }
                    let map = node.as_object_mut().ok_or_else(|| SpaceError::Resolution {
                        path: self.to_string(),
                    })?;
                    map.entry(k.clone()).or_insert(ConfigNode::Null)
                }
                PathStep::Index(i) => node
                    .as_array_mut()
                    .and_then(|seq| seq.get_mut(*i))
                    .ok_or_else(|| SpaceError::Resolution {
                        path: self.to_string(),
                    })?,
            };
        }
        *node = value;
        Ok(())
    }
}

impl fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::Key(k) if i == 0 => write!(f, "{k}")?,
                PathStep::Key(k) => write!(f, ".{k}")?,
                PathStep::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for ParameterPath {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| SpaceError::InvalidPath {
            path: s.to_string(),
            message: message.to_string(),
        };

        let mut steps = Vec::new();
        let mut key = String::new();
        // A key is expected at the start and after every '.'.
        let mut expect_key = true;
        let mut chars = s.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if expect_key && key.is_empty() {
                        return Err(invalid("empty key"));
                    }
                    if !key.is_empty() {
                        steps.push(PathStep::Key(std::mem::take(&mut key)));
                    }
                    expect_key = true;
                }
                '[' => {
                    if !key.is_empty() {
                        steps.push(PathStep::Key(std::mem::take(&mut key)));
                    } else if expect_key && !steps.is_empty() {
                        return Err(invalid("empty key"));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(_) => return Err(invalid("index must be a non-negative integer")),
                            None => return Err(invalid("unterminated index")),
                        }
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("index must be a non-negative integer"))?;
                    steps.push(PathStep::Index(index));
                    expect_key = false;
                }
                ']' => return Err(invalid("unbalanced ']'")),
                other => {
                    if !expect_key {
                        return Err(invalid("expected '.' or '[' after index"));
                    }
                    key.push(other);
                }
            }
        }

        if !key.is_empty() {
            steps.push(PathStep::Key(key));
        } else if expect_key && !steps.is_empty() {
            return Err(invalid("trailing '.'"));
        }

        Ok(Self { steps })
    }
}

impl Serialize for ParameterPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ParameterPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
