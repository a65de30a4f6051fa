//! Derived fast-lookup structure over a rule-set snapshot.

use std::collections::HashMap;

use super::rule::MappingRule;

/// Immutable index from source key code to the enabled rules listening on it.
///
/// Built fresh from a rule-set snapshot on the control thread and published
/// whole; never mutated incrementally. `is_monitored` is the hot-path
/// short-circuit: the vast majority of key codes have no rule and must be
/// rejected with a single hash probe.
#[derive(Debug, Default)]
pub struct MappingIndex {
    by_key: HashMap<u16, Vec<MappingRule>>,
}

impl MappingIndex {
    /// Build the index from a rule-set snapshot.
    ///
    /// Disabled rules are dropped. Rules sharing a source key code keep
    /// their original relative order, which is the first-match-wins
    /// evaluation order of the pipeline.
    pub fn build(rules: &[MappingRule]) -> Self {
        let mut by_key: HashMap<u16, Vec<MappingRule>> = HashMap::new();
        for rule in rules.iter().filter(|r| r.enabled) {
            by_key.entry(rule.source_key).or_default().push(rule.clone());
        }
        Self { by_key }
    }

    /// O(1) test: does at least one enabled rule listen on this key code?
    pub fn is_monitored(&self, key_code: u16) -> bool {
        self.by_key.contains_key(&key_code)
    }

    /// Rules to evaluate for a key code, in first-match-wins order.
    /// Empty for unmonitored keys.
    pub fn candidates(&self, key_code: u16) -> &[MappingRule] {
        self.by_key.get(&key_code).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct monitored key codes.
    pub fn monitored_key_count(&self) -> usize {
        self.by_key.len()
    }

    /// True if no enabled rule survived the build.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
