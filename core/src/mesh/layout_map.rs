//! Name-keyed layout rules.
//!
//! A whole model's sharding strategy collapses into one declarative table:
//! a list of `(regex, layout)` rules. Each weight has a path-style name
//! (`transformer/layer_0/attention_layer/query/kernel`); the first rule
//! whose pattern matches anywhere in the name decides its layout, and
//! weights matched by no rule stay fully replicated.

use super::{Layout, Result};
use regex::Regex;

/// An ordered set of regex-to-layout rules.
#[derive(Clone, Debug, Default)]
pub struct LayoutMap {
    rules: Vec<(Regex, Layout)>,
}

impl LayoutMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Rules are consulted in insertion order.
    ///
    /// The pattern is an unanchored regex: it matches anywhere in the
    /// weight name.
    pub fn insert(&mut self, pattern: &str, layout: Layout) -> Result<()> {
        let regex = Regex::new(pattern)?;
        self.rules.push((regex, layout));
        Ok(())
    }

    /// The layout of the first rule matching `name`, if any.
    pub fn resolve(&self, name: &str) -> Option<&Layout> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(name))
            .map(|(_, layout)| layout)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates the rules in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Layout)> {
        self.rules
            .iter()
            .map(|(regex, layout)| (regex.as_str(), layout))
    }
}
