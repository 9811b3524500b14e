//! The ordered, immutable rule list.

use std::sync::Arc;

use crate::identity::IdentityResolver;
use crate::matcher::{self, Decision, Request};
use crate::rule::Rule;

/// Rules in declared order.
///
/// Built once, fully, before any decision and never modified afterwards.
/// Cloning shares the underlying slice.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Arc<[Rule]>,
}

impl RuleStore {
    /// Freeze a rule list. Order is preserved exactly.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// The rules in declared order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the store has no rules (and therefore denies everything).
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over the rules in declared order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Decide a request. See [`matcher::authorize`].
    pub fn authorize<R>(&self, resolver: &R, request: &Request<'_>) -> Decision<'_>
    where
        R: IdentityResolver + ?Sized,
    {
        matcher::authorize(resolver, &self.rules, request)
    }
}

impl From<Vec<Rule>> for RuleStore {
    fn from(rules: Vec<Rule>) -> Self {
        Self::new(rules)
    }
}

impl<'a> IntoIterator for &'a RuleStore {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
