//! Decision tree scoring.
//!
//! Trees are defined as a flat node table where each node names its parent.
//! `prepare` turns that into a child index so scoring is a simple descent:
//! from the root, step into the first child whose predicate holds, and return
//! the score of the deepest node reached.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::{Record, Schema, Value};
use crate::error::PatternError;
use crate::models::{ModelDescriptor, Predicate};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TreeNode {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub predicate: Predicate,
    pub score: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TreeModel {
    nodes: Vec<TreeNode>,
    #[serde(skip)]
    root: usize,
    #[serde(skip)]
    children: Vec<Vec<usize>>,
}

impl TreeModel {
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Result<Self, PatternError> {
        let mut model: TreeModel = descriptor.params()?;

        let ids: HashMap<&str, usize> = model
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| (n.id.as_str(), idx))
            .collect();
        if ids.len() != model.nodes.len() {
            return Err(PatternError::malformed("tree node ids must be unique"));
        }

        let mut roots = Vec::new();
        for (idx, node) in model.nodes.iter().enumerate() {
            match &node.parent {
                None => roots.push(idx),
                Some(parent) if !ids.contains_key(parent.as_str()) => {
                    return Err(PatternError::malformed(format!(
                        "tree node `{}` names unknown parent `{parent}`",
                        node.id
                    )));
                }
                Some(_) => {}
            }
        }
        model.root = match roots.as_slice() {
            [root] => *root,
            [] => return Err(PatternError::malformed("tree has no root node")),
            _ => return Err(PatternError::malformed("tree has more than one root node")),
        };

        Ok(model)
    }

    pub fn collect_fields(&self, out: &mut Vec<String>) {
        for node in &self.nodes {
            node.predicate.collect_fields(out);
        }
    }

    /// Build the child index. Children keep their definition order.
    pub fn prepare(&mut self) {
        let ids: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| (n.id.as_str(), idx))
            .collect();
        let mut children = vec![Vec::new(); self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent.as_deref().and_then(|p| ids.get(p)) {
                children[*parent].push(idx);
            }
        }
        self.children = children;
    }

    pub fn score(&self, record: &Record, schema: &Schema) -> Result<Value, String> {
        let root = &self.nodes[self.root];
        if !root.predicate.evaluate(record, schema)? {
            return Err("no tree node matched the record".to_string());
        }

        let mut current = self.root;
        'descend: loop {
            for &child in &self.children[current] {
                if self.nodes[child].predicate.evaluate(record, schema)? {
                    current = child;
                    continue 'descend;
                }
            }
            break;
        }

        Ok(self.nodes[current].score.clone())
    }
}
