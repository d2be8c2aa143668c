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

//! Structural and value mutation of individuals, guided by learned impacts.

use crate::action::ActionCatalog;
use crate::config::SearchConfig;
use crate::errors::SearchError;
use crate::fitness::{EvaluatedIndividual, FitnessFunction};
use crate::gene::Gene;
use crate::impact::{GeneSelectionMethod, ImpactTracker};
use crate::individual::{GeneAddress, Individual, SampleOrigin};
use crate::randomness::Randomness;
use crate::state::SearchState;
use crate::types::{GeneId, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Change applied to the main action sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralMutation {
    Add { index: usize },
    Remove { index: usize },
    Move { from: usize, to: usize },
}

/// What one call to [`Mutator::mutate`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutatedGeneSpecification {
    /// Top-level genes whose value was mutated.
    pub mutated_genes: Vec<GeneId>,
    pub structural: Option<StructuralMutation>,
    /// Actions inserted by the repair pass.
    pub repaired_actions: usize,
}

impl MutatedGeneSpecification {
    pub fn is_structural(&self) -> bool {
        self.structural.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Mutator {
    structure_mutation_probability: f64,
    max_test_size: usize,
    gene_selection: GeneSelectionMethod,
    impacts: ImpactTracker,
}

impl Mutator {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            structure_mutation_probability: config.structure_mutation_probability,
            max_test_size: config.max_test_size,
            gene_selection: config.gene_selection_method,
            impacts: ImpactTracker::new(),
        }
    }

    pub fn impacts(&self) -> &ImpactTracker {
        &self.impacts
    }

    /// Returns a mutated copy of `parent`; the parent is never modified.
    ///
    /// `focus` are the targets whose impacts scale the gene weights.
    pub fn mutate(
        &self,
        parent: &Individual,
        catalog: &ActionCatalog,
        rng: &mut Randomness,
        focus: &BTreeSet<TargetId>,
    ) -> Result<(Individual, MutatedGeneSpecification), SearchError> {
        let mut child = parent.clone();
        child.origin = SampleOrigin::Mutated;

        let has_genes = child
            .gene_addresses()
            .iter()
            .any(|a| self.top_level_gene(&child, a).is_some_and(|g| g.is_mutable()));
        let can_restructure = child.size() > 1 || child.size() < self.max_test_size;

        let structural = match (has_genes, can_restructure) {
            (false, false) => {
                return Err(SearchError::StructuralError("individual has nothing to mutate".to_string()))
            }
            (false, true) => true,
            (true, false) => false,
            (true, true) => rng.next_bool(self.structure_mutation_probability),
        };

        let spec = if structural {
            self.mutate_structure(&mut child, catalog, rng)?
        } else {
            self.mutate_values(&mut child, rng, focus)?
        };
        trace!(genes = spec.mutated_genes.len(), structural = ?spec.structural, "mutated individual");
        Ok((child, spec))
    }

    fn top_level_gene<'a>(
        &self,
        individual: &'a Individual,
        address: &GeneAddress,
    ) -> Option<&'a Gene> {
        individual
            .action(address.section, address.action)
            .and_then(|a| a.params.get(address.param))
            .map(|p| &p.gene)
    }

    fn mutate_structure(
        &self,
        individual: &mut Individual,
        catalog: &ActionCatalog,
        rng: &mut Randomness,
    ) -> Result<MutatedGeneSpecification, SearchError> {
        let size = individual.size();
        let mut options = Vec::new();
        if size < self.max_test_size {
            options.push(0);
        }
        if size > 1 {
            options.push(1);
            options.push(2);
        }
        let choice = *rng
            .choose(&options)
            .ok_or_else(|| SearchError::StructuralError("no structural mutation applies".to_string()))?;

        let mutation = match choice {
            0 => {
                let action = catalog.sample_main(rng)?;
                let index = rng.next_usize(0, size);
                individual.main_actions.insert(index, action);
                StructuralMutation::Add { index }
            }
            1 => {
                let index = rng.next_usize(0, size - 1);
                individual.main_actions.remove(index);
                StructuralMutation::Remove { index }
            }
            _ => {
                let picked = rng.choose_indices(size, 2);
                let (from, to) = (picked[0], picked[1]);
                let action = individual.main_actions.remove(from);
                individual.main_actions.insert(to, action);
                StructuralMutation::Move { from, to }
            }
        };

        let repaired_actions = individual.repair(catalog, rng, self.max_test_size)?;
        Ok(MutatedGeneSpecification {
            mutated_genes: Vec::new(),
            structural: Some(mutation),
            repaired_actions,
        })
    }

    fn mutate_values(
        &self,
        individual: &mut Individual,
        rng: &mut Randomness,
        focus: &BTreeSet<TargetId>,
    ) -> Result<MutatedGeneSpecification, SearchError> {
        let view: &Individual = individual;
        let candidates: Vec<GeneAddress> = view
            .gene_addresses()
            .into_iter()
            .filter(|a| self.top_level_gene(view, a).is_some_and(|g| g.is_mutable()))
            .collect();
        let ids: Vec<GeneId> = candidates.iter().filter_map(|a| view.gene_id(a)).collect();

        let mut weights: Vec<f64> = candidates
            .iter()
            .map(|a| self.top_level_gene(view, a).map_or(0.0, |g| g.mutation_weight()))
            .collect();
        if self.gene_selection.is_enabled() && !focus.is_empty() && ids.len() == weights.len() {
            let learned = self.impacts.weights(&ids, focus, self.gene_selection);
            for (w, l) in weights.iter_mut().zip(learned) {
                *w *= l;
            }
        }

        let first = rng
            .choose_weighted_index(&weights)
            .ok_or_else(|| SearchError::genotype("*", "no mutable gene"))?;
        let mut selected = vec![first];
        let n = candidates.len();
        for i in 0..n {
            if i != first && rng.next_bool(1.0 / n as f64) {
                selected.push(i);
            }
        }
        selected.sort_unstable();

        let mut mutated_genes = Vec::with_capacity(selected.len());
        for i in selected {
            let address = &candidates[i];
            let action = individual
                .action_mut(address.section, address.action)
                .ok_or_else(|| SearchError::InternalError("stale gene address".to_string()))?;
            let action_name = action.name.clone();
            let param = action
                .params
                .get_mut(address.param)
                .ok_or_else(|| SearchError::InternalError("stale gene address".to_string()))?;
            let gene = &mut param.gene;
            gene.mutate(rng);
            if !gene.is_locally_valid() {
                gene.randomize(rng, false);
                if !gene.is_locally_valid() {
                    return Err(SearchError::genotype(gene.name(), "no valid value after re-randomization"));
                }
            }
            mutated_genes.push(GeneId::new(&action_name, &param.name));
        }

        Ok(MutatedGeneSpecification {
            mutated_genes,
            structural: None,
            repaired_actions: 0,
        })
    }

    /// Applies up to `upto_n_mutations` consecutive mutations starting from
    /// `parent`, evaluating each one.
    ///
    /// A mutant replaces the current individual (and is offered to the
    /// archive) when it reaches a new target or is not subsumed by the
    /// current one on the uncovered targets. A discarded mutation re-evaluates
    /// the unmodified current individual. Returns the last kept individual.
    pub async fn mutate_and_save<F>(
        &mut self,
        upto_n_mutations: usize,
        parent: EvaluatedIndividual,
        focus: Option<&TargetId>,
        catalog: &ActionCatalog,
        fitness: &mut F,
        state: &mut SearchState,
    ) -> Result<EvaluatedIndividual, SearchError>
    where
        F: FitnessFunction + ?Sized,
    {
        let mut current = parent;
        let targets = state.archive.not_covered_targets();
        let focus: BTreeSet<TargetId> = match focus {
            Some(t) => BTreeSet::from([t.clone()]),
            None => targets.clone(),
        };

        for _ in 0..upto_n_mutations {
            if !state.time.should_continue_search() {
                break;
            }
            state.stats.mutations += 1;
            let (candidate, spec) = match self.mutate(&current.individual, catalog, &mut state.rng, &focus) {
                Ok(mutation) => mutation,
                Err(e) => {
                    debug!(error = %e, "mutation discarded, reusing parent");
                    state.stats.record_error(&e);
                    (current.individual.clone(), MutatedGeneSpecification::default())
                }
            };
            if spec.is_structural() {
                state.stats.structural_mutations += 1;
            }
            if spec.repaired_actions > 0 {
                state.stats.repairs += 1;
            }

            let Some(mutated) = state.evaluate(fitness, &candidate).await? else {
                continue;
            };

            let reach_new = state.archive.would_reach_new_target(&mutated);
            let not_worse = reach_new || !current.fitness.subsumes(&mutated.fitness, &targets);

            if self.gene_selection.is_enabled() && !spec.mutated_genes.is_empty() {
                let mut observed = targets.clone();
                observed.extend(
                    mutated
                        .fitness
                        .reached_targets()
                        .filter(|t| !state.archive.is_covered(t))
                        .cloned(),
                );
                let (impacted, improved) = mutated.fitness.differences(&current.fitness, &observed);
                self.impacts
                    .record(&spec.mutated_genes, &observed, &impacted, &improved, not_worse);
            }

            if not_worse {
                state.save(&mutated);
                state.stats.kept_mutants += 1;
                current = mutated;
            }
        }
        Ok(current)
    }
}
