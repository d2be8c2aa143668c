// Copyright 2024 Strand Project
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Learned per-(gene, target) impact statistics.
//!
//! Records are created on first observation and only ever accumulate for the
//! rest of the run. They are consumed solely to turn into relative mutation
//! weights, which are always at least `1`.

use crate::types::{GeneId, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How impact statistics are turned into gene selection weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneSelectionMethod {
    /// Impact learning disabled; weights come from the gene structure only.
    None,
    /// Prefer genes rarely mutated without effect on the targets.
    AwayNoImpact,
    /// Prefer genes that often changed the targets.
    #[default]
    ApproachImpact,
    /// Like `ApproachImpact`, also preferring a recent impact.
    ApproachLatestImpact,
    /// Like `ApproachImpact`, also preferring a recent improvement.
    ApproachLatestImprovement,
    /// Balance impact against the lack of it.
    BalanceImpactNoImpact,
}

impl GeneSelectionMethod {
    pub fn is_enabled(&self) -> bool {
        *self != GeneSelectionMethod::None
    }

    fn properties(&self) -> &'static [ImpactProperty] {
        match self {
            GeneSelectionMethod::None => &[],
            GeneSelectionMethod::AwayNoImpact => &[ImpactProperty::TimesNoImpactWithTarget],
            GeneSelectionMethod::ApproachImpact => &[ImpactProperty::TimesImpact],
            GeneSelectionMethod::ApproachLatestImpact => {
                &[ImpactProperty::TimesImpact, ImpactProperty::ConsecutiveNoImpactFromImpact]
            }
            GeneSelectionMethod::ApproachLatestImprovement => {
                &[ImpactProperty::TimesImpact, ImpactProperty::ConsecutiveNoImprovement]
            }
            GeneSelectionMethod::BalanceImpactNoImpact => {
                &[ImpactProperty::TimesImpact, ImpactProperty::TimesNoImpactWithTarget]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImpactProperty {
    TimesImpact,
    TimesNoImpactWithTarget,
    ConsecutiveNoImpactFromImpact,
    ConsecutiveNoImprovement,
}

/// Counters of one gene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneImpact {
    pub times_to_manipulate: u64,
    pub times_of_no_impact: u64,
    pub times_of_impact: BTreeMap<TargetId, u64>,
    pub times_of_no_impact_with_targets: BTreeMap<TargetId, u64>,
    /// Mutations without impact since the last impact, per target.
    pub no_impact_from_impact: BTreeMap<TargetId, u64>,
    /// Mutations without improvement since the last improvement, per target.
    pub no_improvement: BTreeMap<TargetId, u64>,
}

fn increment(map: &mut BTreeMap<TargetId, u64>, target: &TargetId) {
    *map.entry(target.clone()).or_insert(0) += 1;
}

impl GeneImpact {
    /// Updates the counters after the gene took part in a mutation.
    ///
    /// With `only_manipulation` the impacted targets are registered without
    /// being counted (the mutant was not kept).
    pub fn count_impact_and_performance(
        &mut self,
        no_impact_targets: &BTreeSet<TargetId>,
        impact_targets: &BTreeSet<TargetId>,
        improved_targets: &BTreeSet<TargetId>,
        only_manipulation: bool,
    ) {
        self.times_to_manipulate += 1;
        if impact_targets.is_empty() {
            for streak in self.no_impact_from_impact.values_mut() {
                *streak += 1;
            }
            for streak in self.no_improvement.values_mut() {
                *streak += 1;
            }
            self.times_of_no_impact += 1;
            for target in no_impact_targets {
                increment(&mut self.times_of_no_impact_with_targets, target);
            }
            return;
        }

        for target in impact_targets {
            if only_manipulation {
                self.times_of_impact.entry(target.clone()).or_insert(0);
                continue;
            }
            increment(&mut self.times_of_impact, target);
            self.no_impact_from_impact.insert(target.clone(), 0);
            if improved_targets.contains(target) {
                self.no_improvement.insert(target.clone(), 0);
            } else {
                increment(&mut self.no_improvement, target);
            }
        }
        if !only_manipulation {
            for (target, streak) in self.no_impact_from_impact.iter_mut() {
                if !impact_targets.contains(target) {
                    *streak += 1;
                }
            }
            for (target, streak) in self.no_improvement.iter_mut() {
                if !impact_targets.contains(target) {
                    *streak += 1;
                }
            }
        }
    }

    fn counter(&self, property: ImpactProperty, target: &TargetId) -> Option<u64> {
        match property {
            ImpactProperty::TimesImpact => self.times_of_impact.get(target),
            ImpactProperty::TimesNoImpactWithTarget => self.times_of_no_impact_with_targets.get(target),
            ImpactProperty::ConsecutiveNoImpactFromImpact => self.no_impact_from_impact.get(target),
            ImpactProperty::ConsecutiveNoImprovement => self.no_improvement.get(target),
        }
        .copied()
    }

    /// "The more, the better" score of one property over `targets`, `None`
    /// when the gene was never tried against them.
    ///
    /// A gene already mutated without ever impacting `targets` scores zero
    /// impacts rather than counting as unexplored.
    fn score(&self, property: ImpactProperty, targets: &BTreeSet<TargetId>) -> Option<f64> {
        let max = targets.iter().filter_map(|t| self.counter(property, t)).max();
        match (property, max) {
            (ImpactProperty::TimesImpact, Some(max)) => Some(max as f64),
            (ImpactProperty::TimesImpact, None) if self.times_to_manipulate > 0 => Some(0.0),
            (_, Some(max)) => Some(self.times_to_manipulate.saturating_sub(max) as f64),
            (_, None) => None,
        }
    }
}

/// Impact records of every gene seen during the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactTracker {
    impacts: BTreeMap<GeneId, GeneImpact>,
}

impl ImpactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gene: &GeneId) -> Option<&GeneImpact> {
        self.impacts.get(gene)
    }

    pub fn len(&self) -> usize {
        self.impacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impacts.is_empty()
    }

    /// Records one evaluated mutation for every gene in `mutated`.
    ///
    /// Targets of `targets` that are not in `impacted` count as no-impact.
    pub fn record(
        &mut self,
        mutated: &[GeneId],
        targets: &BTreeSet<TargetId>,
        impacted: &BTreeSet<TargetId>,
        improved: &BTreeSet<TargetId>,
        kept: bool,
    ) {
        let no_impact: BTreeSet<TargetId> = targets.difference(impacted).cloned().collect();
        for gene in mutated {
            self.impacts
                .entry(gene.clone())
                .or_default()
                .count_impact_and_performance(&no_impact, impacted, improved, !kept);
        }
    }

    /// Relative selection weight of each gene in `genes` for `targets`.
    ///
    /// Genes without a record for a property get the current maximum of that
    /// property, so unexplored genes are never starved. Every weight is the
    /// sum of the property scores plus one.
    pub fn weights(&self, genes: &[GeneId], targets: &BTreeSet<TargetId>, method: GeneSelectionMethod) -> Vec<f64> {
        let properties = method.properties();
        if properties.is_empty() {
            return vec![1.0; genes.len()];
        }
        let raw: Vec<Vec<Option<f64>>> = genes
            .iter()
            .map(|g| {
                properties
                    .iter()
                    .map(|p| self.impacts.get(g).and_then(|impact| impact.score(*p, targets)))
                    .collect()
            })
            .collect();
        let maxima: Vec<f64> = (0..properties.len())
            .map(|pi| raw.iter().filter_map(|row| row[pi]).fold(0.0, f64::max))
            .collect();
        raw.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(pi, v)| v.unwrap_or(maxima[pi]))
                    .sum::<f64>()
                    + 1.0
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<TargetId> {
        ids.iter().map(|s| TargetId::from(*s)).collect()
    }

    #[test]
    fn test_counting_impact_and_no_impact() {
        let mut tracker = ImpactTracker::new();
        let a = GeneId::new("GET /x", "a");
        let targets = set(&["T1", "T2"]);
        tracker.record(&[a.clone()], &targets, &set(&["T1"]), &set(&["T1"]), true);
        tracker.record(&[a.clone()], &targets, &set(&[]), &set(&[]), true);
        let impact = tracker.get(&a).unwrap();
        assert_eq!(impact.times_to_manipulate, 2);
        assert_eq!(impact.times_of_impact.get(&TargetId::from("T1")), Some(&1));
        assert_eq!(impact.times_of_no_impact, 1);
        assert_eq!(impact.times_of_no_impact_with_targets.get(&TargetId::from("T2")), Some(&1));
        assert_eq!(impact.no_impact_from_impact.get(&TargetId::from("T1")), Some(&1));
    }

    #[test]
    fn test_only_manipulation_registers_without_counting() {
        let mut impact = GeneImpact::default();
        impact.count_impact_and_performance(&set(&[]), &set(&["T"]), &set(&[]), true);
        assert_eq!(impact.times_of_impact.get(&TargetId::from("T")), Some(&0));
        assert_eq!(impact.times_to_manipulate, 1);
        assert!(impact.no_improvement.is_empty());
    }

    #[test]
    fn test_impactful_gene_weighs_more() {
        let mut tracker = ImpactTracker::new();
        let hot = GeneId::new("A", "hot");
        let cold = GeneId::new("A", "cold");
        let targets = set(&["T"]);
        for _ in 0..5 {
            tracker.record(&[hot.clone()], &targets, &targets, &set(&[]), true);
            tracker.record(&[cold.clone()], &targets, &set(&[]), &set(&[]), true);
        }
        tracker.record(&[hot.clone()], &targets, &set(&[]), &set(&[]), true);

        let genes = [hot, cold];
        let w = tracker.weights(&genes, &targets, GeneSelectionMethod::default());
        assert_eq!(w, vec![6.0, 1.0]);

        // hot: 5 + (6 - 1) + 1, cold: 0 + (5 - 5) + 1
        let w = tracker.weights(&genes, &targets, GeneSelectionMethod::BalanceImpactNoImpact);
        assert_eq!(w, vec![11.0, 1.0]);
    }

    #[test]
    fn test_default_method_prefers_genes_with_impact() {
        let mut tracker = ImpactTracker::new();
        let hot = GeneId::new("A", "hot");
        let cold = GeneId::new("A", "cold");
        let fresh = GeneId::new("A", "fresh");
        let targets = set(&["T"]);
        for _ in 0..20 {
            tracker.record(&[hot.clone()], &targets, &targets, &set(&[]), true);
            tracker.record(&[cold.clone()], &targets, &set(&[]), &set(&[]), true);
        }
        let w = tracker.weights(&[hot, cold, fresh], &targets, GeneSelectionMethod::default());
        assert!(w[0] > w[1], "{:?}", w);
        // a gene never mutated is still given the best score seen
        assert_eq!(w[2], w[0]);
    }

    #[test]
    fn test_away_no_impact_down_weights_but_not_to_zero() {
        let mut tracker = ImpactTracker::new();
        let stale = GeneId::new("A", "stale");
        let fresh = GeneId::new("A", "fresh");
        let targets = set(&["T"]);
        for _ in 0..10 {
            tracker.record(&[stale.clone()], &targets, &set(&[]), &set(&[]), true);
        }
        for _ in 0..3 {
            tracker.record(&[fresh.clone()], &targets, &targets, &set(&[]), true);
        }
        tracker.record(&[fresh.clone()], &targets, &set(&[]), &set(&[]), true);
        let w = tracker.weights(&[stale, fresh], &targets, GeneSelectionMethod::AwayNoImpact);
        assert_eq!(w, vec![1.0, 4.0]);
    }

    #[test]
    fn test_disabled_method_is_uniform() {
        let tracker = ImpactTracker::new();
        let genes = [GeneId::new("A", "x"), GeneId::new("A", "y")];
        assert_eq!(tracker.weights(&genes, &set(&["T"]), GeneSelectionMethod::None), vec![1.0, 1.0]);
    }
}
