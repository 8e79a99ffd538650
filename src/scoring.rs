//! Per-rule scoring tables: feature-keyed `(score, weight, count)` triples
//! with an online-mean update rule.

use std::collections::BTreeMap;

use crate::category::Category;
use crate::error::{Error, Result};
use crate::symbol::Symbol;

/// A value-typed scoring feature key, as emitted by leaf and branch rules.
///
/// `None` (handled at the [`ScoringTable`] level, not here) stands for the
/// sentinel "default" entry that always exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKey {
    /// `("head spelling", (category_name, token))`
    HeadSpelling { category: Symbol, token: String },
    /// `("head properties", (category_name, property))`
    HeadProperty { category: Symbol, property: Symbol },
    /// `("body category", (head_category_name, component_category))`
    BodyCategory { head: Symbol, component: Category },
    /// `("body category sequence", (head_category_name, cat_i, cat_j))`
    BodyCategorySequence {
        head: Symbol,
        first: Category,
        second: Category,
    },
}

/// Build the scoring features a leaf rule's derivation emits.
pub fn leaf_features(category_name: Symbol, positive_properties: &std::collections::BTreeSet<Symbol>, token: &str) -> Vec<FeatureKey> {
    let mut features = vec![FeatureKey::HeadSpelling {
        category: category_name,
        token: token.to_string(),
    }];
    features.extend(positive_properties.iter().map(|p| FeatureKey::HeadProperty {
        category: category_name,
        property: *p,
    }));
    features
}

/// Build the scoring features a branch rule's derivation emits: head
/// spelling/properties of the result, plus per-component and per-ordered-pair
/// body-category features.
pub fn branch_features(
    head_category_name: Symbol,
    positive_properties: &std::collections::BTreeSet<Symbol>,
    head_token: &str,
    component_categories: &[Category],
) -> Vec<FeatureKey> {
    let mut features = leaf_features(head_category_name, positive_properties, head_token);
    for component in component_categories {
        features.push(FeatureKey::BodyCategory {
            head: head_category_name,
            component: component.clone(),
        });
    }
    for i in 0..component_categories.len() {
        for j in (i + 1)..component_categories.len() {
            features.push(FeatureKey::BodyCategorySequence {
                head: head_category_name,
                first: component_categories[i].clone(),
                second: component_categories[j].clone(),
            });
        }
    }
    features
}

/// One scoring entry: a mean score, a mean "accuracy" weight, and the number
/// of observations folded into both means so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    pub score: f64,
    pub weight: f64,
    pub count: u64,
}

impl Default for ScoreEntry {
    fn default() -> Self {
        ScoreEntry::DEFAULT
    }
}

impl ScoreEntry {
    pub const DEFAULT: ScoreEntry = ScoreEntry {
        score: 0.5,
        weight: 0.001,
        count: 0,
    };

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.score) {
            return Err(Error::InvalidScore {
                field: "score",
                value: self.score,
            });
        }
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(Error::InvalidScore {
                field: "weight",
                value: self.weight,
            });
        }
        Ok(())
    }

    /// Apply one online-mean update step toward `target`.
    fn update(&mut self, target: f64) {
        self.count += 1;
        let count = self.count as f64;
        self.score += (target - self.score) / count;
        let error = (target - self.score).powi(2);
        self.weight += ((1.0 - error) - self.weight) / count;
    }
}

/// A rule's scoring table: the default entry plus per-feature overrides.
///
/// Uses a `BTreeMap` (rather than a `HashMap`) so that persistence and
/// tests that enumerate "all scoring features" see a deterministic order.
#[derive(Debug, Clone, Default)]
pub struct ScoringTable {
    default: ScoreEntry,
    features: BTreeMap<FeatureKey, ScoreEntry>,
}

impl ScoringTable {
    pub fn new() -> Self {
        ScoringTable {
            default: ScoreEntry::DEFAULT,
            features: BTreeMap::new(),
        }
    }

    pub fn default_entry(&self) -> ScoreEntry {
        self.default
    }

    pub fn get(&self, key: &FeatureKey) -> Option<ScoreEntry> {
        self.features.get(key).copied()
    }

    /// `repr`-stable iteration over every stored feature, used by the
    /// scoring store and by tests asserting scoring bounds hold globally.
    pub fn iter_all(&self) -> impl Iterator<Item = (Option<&FeatureKey>, ScoreEntry)> {
        std::iter::once((None, self.default)).chain(self.features.iter().map(|(k, v)| (Some(k), *v)))
    }

    /// `calculate_weighted_score`: sum the default entry plus every feature
    /// in `emitted` that also exists in this table. Returns `(Σ score·weight,
    /// Σ weight)`.
    pub fn calculate_weighted_score(&self, emitted: &[FeatureKey]) -> (f64, f64) {
        let mut total_score = self.default.score * self.default.weight;
        let mut total_weight = self.default.weight;
        for key in emitted {
            if let Some(entry) = self.features.get(key) {
                total_score += entry.score * entry.weight;
                total_weight += entry.weight;
            }
        }
        (total_score, total_weight)
    }

    /// `adjust_score`: move the default entry, and every entry for a key in
    /// `emitted`, toward `target` by one online-mean step. Entries absent
    /// from the table are seeded from the (pre-update) default with
    /// `count = 1` before the step is applied, landing at `count = 2`.
    pub fn adjust_score(&mut self, emitted: &[FeatureKey], target: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&target) {
            return Err(Error::InvalidScore {
                field: "target",
                value: target,
            });
        }
        let seed = self.default;
        self.default.update(target);
        for key in emitted {
            let entry = self.features.entry(key.clone()).or_insert(ScoreEntry {
                score: seed.score,
                weight: seed.weight,
                count: 1,
            });
            entry.update(target);
            entry.validate()?;
        }
        self.default.validate()?;
        Ok(())
    }

    /// Directly set a stored entry, validating bounds (used by persistence
    /// load).
    pub fn set_score(&mut self, key: Option<FeatureKey>, entry: ScoreEntry) -> Result<()> {
        entry.validate()?;
        match key {
            None => self.default = entry,
            Some(key) => {
                self.features.insert(key, entry);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_entry_is_the_documented_sentinel() {
        let table = ScoringTable::new();
        assert_eq!(table.default_entry(), ScoreEntry::DEFAULT);
    }

    #[test]
    fn weighted_score_uses_default_when_no_features_stored() {
        let table = ScoringTable::new();
        let (score, weight) = table.calculate_weighted_score(&[]);
        assert_eq!(weight, ScoreEntry::DEFAULT.weight);
        assert_eq!(score, ScoreEntry::DEFAULT.score * ScoreEntry::DEFAULT.weight);
    }

    #[test]
    fn adjust_score_rejects_out_of_range_target() {
        let mut table = ScoringTable::new();
        assert!(table.adjust_score(&[], 1.5).is_err());
        assert!(table.adjust_score(&[], -0.1).is_err());
    }

    #[test]
    fn repeated_positive_feedback_is_monotone_nondecreasing() {
        let mut table = ScoringTable::new();
        let key = FeatureKey::HeadProperty {
            category: Symbol::default(),
            property: Symbol::default(),
        };
        let mut last = table.default_entry().score;
        for _ in 0..20 {
            table.adjust_score(&[key.clone()], 1.0).unwrap();
            let current = table.get(&key).unwrap().score;
            assert!(current >= last - 1e-12);
            last = current;
        }
    }

    #[test]
    fn scores_and_weights_stay_bounded() {
        let mut table = ScoringTable::new();
        let key = FeatureKey::HeadProperty {
            category: Symbol::default(),
            property: Symbol::default(),
        };
        for i in 0..50 {
            let target = if i % 2 == 0 { 1.0 } else { 0.0 };
            table.adjust_score(&[key.clone()], target).unwrap();
        }
        for (_, entry) in table.iter_all() {
            assert!((0.0..=1.0).contains(&entry.score));
            assert!((0.0..=1.0).contains(&entry.weight));
        }
    }
}
