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

//! # Many-objective archive
//!
//! One bounded population per reached, not yet covered target. Populations
//! are kept sorted worst-first, so index `0` is the member evicted or replaced
//! on insertion and the last element is the current best.
//!
//! A target whose heuristic reaches [`MAX_VALUE`] moves to the covered record,
//! which keeps a single representative and only grows: a covered target is
//! never re-optimised and never becomes active again.

use crate::fitness::{ActionStatus, EvaluatedIndividual, MAX_VALUE};
use crate::randomness::Randomness;
use crate::statistics::{Solution, Termination};
use crate::types::TargetId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Secondary insertion rule for a full population when the candidate is
/// exactly as fit as the worst member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveTieBreak {
    /// Replace when strictly shorter, or no longer and with an action-name
    /// multiset not present in the population.
    #[default]
    ShorterOrDiverse,
    /// Replace only when strictly shorter.
    Shorter,
    /// Replace whenever equivalent.
    Equivalent,
    /// Never replace on ties.
    Never,
}

/// How the target whose population provides the next parent is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSelection {
    /// Uniformly at random.
    Random,
    /// The target sampled the fewest times since its last improvement.
    Last,
    /// Stick with the last chosen target while it keeps improving at its
    /// usual pace, then move to the quickest improving one.
    FocusedQuickest,
    /// Weighted towards targets furthest from being covered.
    #[default]
    WorstHeuristic,
}

/// Outcome of [`Archive::add_if_needed`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveUpdate {
    /// The individual was stored in at least one population.
    pub added: bool,
    /// Targets on which the individual is strictly better than the worst member
    /// (or is the first individual to reach them).
    pub improved: BTreeSet<TargetId>,
    /// Targets covered for the first time.
    pub newly_covered: Vec<TargetId>,
}

impl ArchiveUpdate {
    pub fn any_improvement(&self) -> bool {
        !self.improved.is_empty()
    }
}

/// Bounded per-target populations plus the covered record.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    populations: BTreeMap<TargetId, Vec<EvaluatedIndividual>>,
    covered: BTreeMap<TargetId, EvaluatedIndividual>,
    sampling_counter: BTreeMap<TargetId, u64>,
    last_improvement: BTreeMap<TargetId, u64>,
    last_chosen: Option<TargetId>,
    tie_break: ArchiveTieBreak,
    selection: TargetSelection,
}

impl Archive {
    pub fn new(tie_break: ArchiveTieBreak, selection: TargetSelection) -> Self {
        Self {
            tie_break,
            selection,
            ..Self::default()
        }
    }

    /// Offers `ei` to every population it reaches.
    ///
    /// Targets with heuristic `0` are ignored. `limit` is the current
    /// per-target capacity (see [`crate::parameters::AdaptiveParameterControl`]).
    pub fn add_if_needed(&mut self, ei: &EvaluatedIndividual, limit: usize) -> ArchiveUpdate {
        let limit = limit.max(1);
        let mut update = ArchiveUpdate::default();

        for (target, heuristic) in ei.fitness.targets() {
            let score = heuristic.score;
            if score <= 0.0 {
                continue;
            }
            let maxed = score >= MAX_VALUE;

            if let Some(representative) = self.covered.get_mut(target) {
                if maxed {
                    let size = ei.individual.size();
                    let current_size = representative.individual.size();
                    let shorter = size < current_size;
                    let same_size_better_overall = size == current_size
                        && ei.fitness.compute_fitness_score() > representative.fitness.compute_fitness_score();
                    if shorter || same_size_better_overall {
                        *representative = ei.clone();
                        update.added = true;
                        update.improved.insert(target.clone());
                        Self::report_improvement(&mut self.sampling_counter, &mut self.last_improvement, target);
                    }
                }
                continue;
            }

            if maxed {
                self.populations.remove(target);
                self.covered.insert(target.clone(), ei.clone());
                update.added = true;
                update.improved.insert(target.clone());
                update.newly_covered.push(target.clone());
                Self::report_improvement(&mut self.sampling_counter, &mut self.last_improvement, target);
                debug!(target = %target, "target covered");
                continue;
            }

            let population = self.populations.entry(target.clone()).or_default();
            if population.is_empty() {
                population.push(ei.clone());
                update.added = true;
                update.improved.insert(target.clone());
                Self::report_improvement(&mut self.sampling_counter, &mut self.last_improvement, target);
                continue;
            }

            sort_and_shrink(population, target, limit);
            let worst = &population[0];
            let better = ei.fitness.better_than(&worst.fitness, target);
            if better {
                update.improved.insert(target.clone());
                Self::report_improvement(&mut self.sampling_counter, &mut self.last_improvement, target);
            }

            if population.len() < limit {
                population.push(ei.clone());
                sort_and_shrink(population, target, limit);
                update.added = true;
                continue;
            }

            if better || accepts_tie(self.tie_break, ei, population, target) {
                population[0] = ei.clone();
                sort_and_shrink(population, target, limit);
                update.added = true;
            }
        }
        update
    }

    fn report_improvement(
        sampling_counter: &mut BTreeMap<TargetId, u64>,
        last_improvement: &mut BTreeMap<TargetId, u64>,
        target: &TargetId,
    ) {
        let counter = sampling_counter.get(target).copied().unwrap_or(0);
        last_improvement.insert(target.clone(), counter);
        sampling_counter.insert(target.clone(), 0);
    }

    /// Picks a parent through feedback-directed target choice.
    ///
    /// Targets come from the active set; when it is empty, from the covered
    /// record. Returns the chosen target with a copy of the chosen member, or
    /// `None` when the archive is empty.
    pub fn sample_individual(
        &mut self,
        rng: &mut Randomness,
        limit: usize,
    ) -> Option<(TargetId, EvaluatedIndividual)> {
        if self.populations.is_empty() {
            let covered: Vec<&TargetId> = self.covered.keys().collect();
            let target = (*rng.choose(&covered)?).clone();
            let chosen = self.covered.get(&target)?.clone();
            self.last_chosen = Some(target.clone());
            return Some((target, chosen));
        }
        let candidates: Vec<TargetId> = self.populations.keys().cloned().collect();
        let target = self.choose_target(&candidates, rng)?;
        let chosen = self.sample_for_target(&target, rng, limit)?;
        Some((target, chosen))
    }

    /// Copy of a member of `target`'s population, avoiding members whose
    /// evaluation timed out when possible.
    pub fn sample_for_target(
        &mut self,
        target: &TargetId,
        rng: &mut Randomness,
        limit: usize,
    ) -> Option<EvaluatedIndividual> {
        if let Some(representative) = self.covered.get(target) {
            return Some(representative.clone());
        }
        let population = self.populations.get_mut(target)?;
        *self.sampling_counter.entry(target.clone()).or_insert(0) += 1;
        self.last_chosen = Some(target.clone());
        sort_and_shrink(population, target, limit.max(1));
        let not_timed_out: Vec<&EvaluatedIndividual> = population
            .iter()
            .filter(|ei| !ei.results.iter().any(|r| r.status == ActionStatus::TimedOut))
            .collect();
        if not_timed_out.is_empty() {
            rng.choose(population.as_slice()).cloned()
        } else {
            rng.choose(&not_timed_out).map(|ei| (*ei).clone())
        }
    }

    /// Uniform choice over every stored individual, active or covered.
    pub fn sample_any(&self, rng: &mut Randomness) -> Option<EvaluatedIndividual> {
        let pool: Vec<&EvaluatedIndividual> = self
            .populations
            .values()
            .flatten()
            .chain(self.covered.values())
            .collect();
        rng.choose(&pool).map(|ei| (*ei).clone())
    }

    fn choose_target(&mut self, candidates: &[TargetId], rng: &mut Randomness) -> Option<TargetId> {
        let chosen = match self.selection {
            TargetSelection::Random => rng.choose(candidates).cloned(),
            TargetSelection::Last => candidates
                .iter()
                .min_by_key(|t| self.sampling_counter.get(*t).copied().unwrap_or(0))
                .cloned(),
            TargetSelection::FocusedQuickest => self.focused_quickest(candidates),
            TargetSelection::WorstHeuristic => {
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|t| 1.0 - self.best_heuristic(t).unwrap_or(0.0) + f64::EPSILON)
                    .collect();
                rng.choose_weighted_index(&weights).map(|i| candidates[i].clone())
            }
        };
        if let Some(target) = &chosen {
            self.last_chosen = Some(target.clone());
        }
        chosen
    }

    fn focused_quickest(&self, candidates: &[TargetId]) -> Option<TargetId> {
        let counter = |t: &TargetId| self.sampling_counter.get(t).copied().unwrap_or(0);
        if let Some(last) = &self.last_chosen {
            // without any improvement yet, allow twice the default patience
            let patience = self.last_improvement.get(last).copied().unwrap_or(10) * 2;
            if candidates.contains(last) && counter(last) < patience {
                return Some(last.clone());
            }
        }
        candidates
            .iter()
            .filter(|t| {
                self.last_improvement
                    .get(*t)
                    .is_some_and(|previous| counter(*t) < *previous * 2)
            })
            .min_by_key(|t| self.last_improvement.get(*t).copied().unwrap_or(u64::MAX))
            .or_else(|| candidates.iter().min_by_key(|t| counter(*t)))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.populations.is_empty() && self.covered.is_empty()
    }

    pub fn is_covered(&self, target: &TargetId) -> bool {
        self.covered.contains_key(target)
    }

    pub fn covered_targets(&self) -> BTreeSet<TargetId> {
        self.covered.keys().cloned().collect()
    }

    /// Reached but not covered.
    pub fn not_covered_targets(&self) -> BTreeSet<TargetId> {
        self.populations.keys().cloned().collect()
    }

    pub fn population(&self, target: &TargetId) -> Option<&[EvaluatedIndividual]> {
        self.populations.get(target).map(Vec::as_slice)
    }

    pub fn covering_individual(&self, target: &TargetId) -> Option<&EvaluatedIndividual> {
        self.covered.get(target)
    }

    /// Best heuristic recorded for `target`, `None` when never reached.
    pub fn best_heuristic(&self, target: &TargetId) -> Option<f64> {
        if self.covered.contains_key(target) {
            return Some(MAX_VALUE);
        }
        self.populations
            .get(target)?
            .iter()
            .map(|ei| ei.fitness.heuristic(target))
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Whether `ei` reaches a target no stored individual has reached.
    pub fn would_reach_new_target(&self, ei: &EvaluatedIndividual) -> bool {
        ei.fitness
            .reached_targets()
            .any(|t| !self.covered.contains_key(t) && self.populations.get(t).map_or(true, Vec::is_empty))
    }

    pub fn number_of_covered_targets(&self) -> usize {
        self.covered.len()
    }

    pub fn number_of_reached_but_not_covered_targets(&self) -> usize {
        self.populations.len()
    }

    pub fn number_of_reached_targets(&self) -> usize {
        self.covered.len() + self.populations.len()
    }

    pub fn average_test_size_for_reached_but_not_covered(&self) -> f64 {
        let sizes: Vec<usize> = self
            .populations
            .values()
            .flatten()
            .map(|ei| ei.individual.size())
            .collect();
        if sizes.is_empty() {
            return 0.0;
        }
        sizes.iter().sum::<usize>() as f64 / sizes.len() as f64
    }

    pub fn sampling_counter(&self, target: &TargetId) -> u64 {
        self.sampling_counter.get(target).copied().unwrap_or(0)
    }

    /// Covering individuals without duplicates (an individual may cover many
    /// targets), plus the best heuristic of every reached target.
    pub fn extract_solution(&self, termination: Termination) -> Solution {
        let mut seen = BTreeSet::new();
        let mut individuals = Vec::new();
        for ei in self.covered.values() {
            if seen.insert(ei.individual.fingerprint()) {
                individuals.push(ei.clone());
            }
        }
        let mut best_heuristics = BTreeMap::new();
        for target in self.covered.keys().chain(self.populations.keys()) {
            if let Some(h) = self.best_heuristic(target) {
                best_heuristics.insert(target.clone(), h);
            }
        }
        Solution {
            individuals,
            covered_targets: self.covered_targets(),
            best_heuristics,
            termination,
        }
    }
}

/// Ascending on the target heuristic, then the extra heuristic, then the
/// negated size: worst first, best last. Drops the worst beyond `limit`.
fn sort_and_shrink(population: &mut Vec<EvaluatedIndividual>, target: &TargetId, limit: usize) {
    population.sort_by(|a, b| compare_for_target(a, b, target));
    while population.len() > limit {
        population.remove(0);
    }
}

fn compare_for_target(a: &EvaluatedIndividual, b: &EvaluatedIndividual, target: &TargetId) -> Ordering {
    a.fitness
        .heuristic(target)
        .total_cmp(&b.fitness.heuristic(target))
        .then_with(|| a.fitness.extra_heuristic().total_cmp(&b.fitness.extra_heuristic()))
        .then_with(|| b.individual.size().cmp(&a.individual.size()))
}

fn accepts_tie(
    rule: ArchiveTieBreak,
    candidate: &EvaluatedIndividual,
    population: &[EvaluatedIndividual],
    target: &TargetId,
) -> bool {
    let Some(worst) = population.first() else {
        return true;
    };
    if !candidate.fitness.equivalent(&worst.fitness, target) {
        return false;
    }
    let shorter = candidate.individual.size() < worst.individual.size();
    match rule {
        ArchiveTieBreak::Never => false,
        ArchiveTieBreak::Equivalent => true,
        ArchiveTieBreak::Shorter => shorter,
        ArchiveTieBreak::ShorterOrDiverse => {
            let multiset = candidate.individual.action_name_multiset();
            let diverse = population
                .iter()
                .all(|member| member.individual.action_name_multiset() != multiset);
            shorter || (diverse && candidate.individual.size() <= worst.individual.size())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::fitness::{ActionResult, FitnessValue};
    use crate::individual::{Individual, SampleOrigin};

    fn evaluated(actions: &[&str], scores: &[(&str, f64)]) -> EvaluatedIndividual {
        let main: Vec<Action> = actions.iter().map(|p| Action::rest("GET", p)).collect();
        let mut fitness = FitnessValue::new(main.len());
        for (t, s) in scores {
            fitness.update_target(*t, *s, Some(0));
        }
        let results = (0..main.len()).map(|i| ActionResult::executed(i, Some(200))).collect();
        EvaluatedIndividual::new(Individual::new(vec![], main, SampleOrigin::Random), fitness, results)
    }

    fn archive() -> Archive {
        Archive::new(ArchiveTieBreak::ShorterOrDiverse, TargetSelection::WorstHeuristic)
    }

    #[test]
    fn test_first_reach_creates_population() {
        let mut archive = archive();
        let update = archive.add_if_needed(&evaluated(&["/a"], &[("T1", 0.3), ("T0", 0.0)]), 10);
        assert!(update.added);
        assert_eq!(archive.population(&"T1".into()).map(|p| p.len()), Some(1));
        assert!(archive.population(&"T0".into()).is_none());
    }

    #[test]
    fn test_better_individual_becomes_best() {
        let mut archive = archive();
        archive.add_if_needed(&evaluated(&["/a"], &[("T1", 0.3)]), 10);
        let update = archive.add_if_needed(&evaluated(&["/b"], &[("T1", 0.6)]), 10);
        assert!(update.improved.contains(&TargetId::from("T1")));
        let population = archive.population(&"T1".into()).unwrap();
        assert_eq!(population.last().unwrap().fitness.heuristic(&"T1".into()), 0.6);
        assert_eq!(archive.best_heuristic(&"T1".into()), Some(0.6));
    }

    #[test]
    fn test_capacity_is_respected() {
        let mut archive = archive();
        for i in 0..20 {
            archive.add_if_needed(&evaluated(&["/a"], &[("T", 0.01 * i as f64 + 0.01)]), 3);
            assert!(archive.population(&"T".into()).unwrap().len() <= 3);
        }
        let population = archive.population(&"T".into()).unwrap();
        assert!((population[2].fitness.heuristic(&"T".into()) - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_full_population_rejects_worse() {
        let mut archive = archive();
        archive.add_if_needed(&evaluated(&["/a"], &[("T", 0.5)]), 1);
        let update = archive.add_if_needed(&evaluated(&["/b"], &[("T", 0.4)]), 1);
        assert!(!update.added);
        assert_eq!(archive.best_heuristic(&"T".into()), Some(0.5));
    }

    #[test]
    fn test_tie_break_prefers_shorter_and_diverse() {
        let mut archive = archive();
        archive.add_if_needed(&evaluated(&["/a", "/a"], &[("T", 0.5)]), 1);
        // same fitness, same multiset, same length: rejected
        assert!(!archive.add_if_needed(&evaluated(&["/a", "/a"], &[("T", 0.5)]), 1).added);
        // same fitness, different multiset, same length: accepted
        assert!(archive.add_if_needed(&evaluated(&["/a", "/b"], &[("T", 0.5)]), 1).added);
        // longer, even if diverse: rejected
        assert!(!archive.add_if_needed(&evaluated(&["/c", "/d", "/e"], &[("T", 0.5)]), 1).added);
        // shorter: accepted
        assert!(archive.add_if_needed(&evaluated(&["/a"], &[("T", 0.5)]), 1).added);
        assert_eq!(archive.population(&"T".into()).unwrap()[0].individual.size(), 1);
    }

    #[test]
    fn test_never_tie_break() {
        let mut archive = Archive::new(ArchiveTieBreak::Never, TargetSelection::Random);
        archive.add_if_needed(&evaluated(&["/a", "/a"], &[("T", 0.5)]), 1);
        assert!(!archive.add_if_needed(&evaluated(&["/a"], &[("T", 0.5)]), 1).added);
    }

    #[test]
    fn test_covered_target_leaves_active_set() {
        let mut archive = archive();
        archive.add_if_needed(&evaluated(&["/a"], &[("T2", 0.4)]), 10);
        let update = archive.add_if_needed(&evaluated(&["/a", "/b"], &[("T2", 1.0)]), 10);
        assert_eq!(update.newly_covered, vec![TargetId::from("T2")]);
        assert!(archive.covered_targets().contains(&TargetId::from("T2")));
        assert!(!archive.not_covered_targets().contains(&TargetId::from("T2")));

        // lower heuristics later never un-cover it
        archive.add_if_needed(&evaluated(&["/c"], &[("T2", 0.1)]), 10);
        assert!(archive.is_covered(&"T2".into()));
        assert!(archive.population(&"T2".into()).is_none());

        // a shorter covering individual replaces the representative
        archive.add_if_needed(&evaluated(&["/z"], &[("T2", 1.0)]), 10);
        assert_eq!(archive.covering_individual(&"T2".into()).unwrap().individual.size(), 1);
    }

    #[test]
    fn test_sampling_falls_back_to_covered() {
        let mut archive = archive();
        let mut rng = Randomness::with_seed(3);
        assert!(archive.sample_individual(&mut rng, 10).is_none());
        archive.add_if_needed(&evaluated(&["/a"], &[("T", 1.0)]), 10);
        let (target, chosen) = archive.sample_individual(&mut rng, 10).unwrap();
        assert_eq!(target, TargetId::from("T"));
        assert_eq!(chosen.individual.size(), 1);
        assert!(archive.sample_any(&mut rng).is_some());
    }

    #[test]
    fn test_sampling_counter_resets_on_improvement() {
        let mut archive = archive();
        let mut rng = Randomness::with_seed(3);
        archive.add_if_needed(&evaluated(&["/a"], &[("T", 0.2)]), 10);
        for _ in 0..3 {
            archive.sample_individual(&mut rng, 10).unwrap();
        }
        assert_eq!(archive.sampling_counter(&"T".into()), 3);
        archive.add_if_needed(&evaluated(&["/a"], &[("T", 0.3)]), 10);
        assert_eq!(archive.sampling_counter(&"T".into()), 0);
    }

    #[test]
    fn test_last_selection_picks_least_sampled() {
        let mut archive = Archive::new(ArchiveTieBreak::ShorterOrDiverse, TargetSelection::Last);
        let mut rng = Randomness::with_seed(5);
        archive.add_if_needed(&evaluated(&["/a"], &[("A", 0.2), ("B", 0.2)]), 10);
        let (first, _) = archive.sample_individual(&mut rng, 10).unwrap();
        let (second, _) = archive.sample_individual(&mut rng, 10).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_would_reach_new_target_and_solution() {
        let mut archive = archive();
        let ei = evaluated(&["/a"], &[("A", 1.0), ("B", 1.0), ("C", 0.5)]);
        assert!(archive.would_reach_new_target(&ei));
        archive.add_if_needed(&ei, 10);
        assert!(!archive.would_reach_new_target(&ei));
        let solution = archive.extract_solution(Termination::BudgetExhausted);
        assert_eq!(solution.individuals.len(), 1);
        assert_eq!(solution.covered_targets.len(), 2);
        assert_eq!(solution.best_heuristics.get(&TargetId::from("C")), Some(&0.5));
        assert_eq!(archive.number_of_reached_targets(), 3);
        assert_eq!(archive.average_test_size_for_reached_but_not_covered(), 1.0);
    }
}
