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

//! # Search drivers
//!
//! [`MioAlgorithm`] is the main driver: every iteration either samples a
//! fresh individual or mutates a parent taken from the archive, with the
//! balance shifting from exploration to focused search as the budget is
//! used. [`RandomSearch`] only samples and serves as a baseline.
//!
//! Evaluations are awaited one at a time. The budget is polled at the top of
//! every iteration and after every evaluation.

use crate::action::ActionCatalog;
use crate::config::SearchConfig;
use crate::errors::SearchError;
use crate::fitness::FitnessFunction;
use crate::individual::SampleOrigin;
use crate::mutator::Mutator;
use crate::sampler::{Sampler, SeedCall};
use crate::state::SearchState;
use crate::statistics::{SearchStatistics, Solution};
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait SearchAlgorithm: Send {
    fn name(&self) -> &'static str;

    /// Runs until the budget is used or a fatal fault occurs. A fatal fault
    /// during the run still yields the archive content, with
    /// [`crate::statistics::Termination::Fatal`] as termination.
    async fn search(&mut self) -> Result<Solution, SearchError>;

    fn statistics(&self) -> &SearchStatistics;
}

/// Samples (seeded or random), evaluates and archives one individual.
async fn sample_and_save<F>(state: &mut SearchState, sampler: &mut Sampler, fitness: &mut F) -> Result<(), SearchError>
where
    F: FitnessFunction + ?Sized,
{
    let individual = sampler.sample(&mut state.rng)?;
    match individual.origin {
        SampleOrigin::Seeded => state.stats.seeded_samples += 1,
        _ => state.stats.random_samples += 1,
    }
    if let Some(ei) = state.evaluate(fitness, &individual).await? {
        state.save(&ei);
    }
    Ok(())
}

fn log_finished(name: &str, state: &SearchState, solution: &Solution) {
    info!(
        algorithm = name,
        evaluations = state.time.evaluated_individuals(),
        covered = solution.coverage(),
        tests = solution.individuals.len(),
        termination = ?solution.termination,
        "search finished"
    );
}

/// Many Independent Objective search.
pub struct MioAlgorithm<F> {
    state: SearchState,
    sampler: Sampler,
    mutator: Mutator,
    fitness: F,
}

impl<F: FitnessFunction> MioAlgorithm<F> {
    /// Fails with [`SearchError::ConfigError`] on an invalid configuration
    /// or an empty catalog.
    pub fn new(config: SearchConfig, catalog: ActionCatalog, fitness: F) -> Result<Self, SearchError> {
        let sampler = Sampler::new(catalog, &config)?;
        let mutator = Mutator::new(&config);
        Ok(Self {
            state: SearchState::new(config)?,
            sampler,
            mutator,
            fitness,
        })
    }

    pub fn add_seed(&mut self, calls: Vec<SeedCall>) {
        self.sampler.add_seed(calls);
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn mutator(&self) -> &Mutator {
        &self.mutator
    }

    pub fn fitness(&self) -> &F {
        &self.fitness
    }

    async fn iterate(&mut self) -> Result<(), SearchError> {
        self.state.update_phase();
        let used = self.state.used_budget();
        let prob_random = self.state.apc.prob_of_random_sampling(used);

        let parent = if self.state.archive.is_empty() || self.state.rng.next_bool(prob_random) {
            None
        } else {
            let limit = self.state.archive_target_limit();
            self.state.archive.sample_individual(&mut self.state.rng, limit)
        };

        match parent {
            None => sample_and_save(&mut self.state, &mut self.sampler, &mut self.fitness).await,
            Some((target, parent)) => {
                let n = self.state.apc.number_of_mutations(used);
                self.mutator
                    .mutate_and_save(
                        n,
                        parent,
                        Some(&target),
                        self.sampler.catalog(),
                        &mut self.fitness,
                        &mut self.state,
                    )
                    .await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<F: FitnessFunction> SearchAlgorithm for MioAlgorithm<F> {
    fn name(&self) -> &'static str {
        "MIO"
    }

    async fn search(&mut self) -> Result<Solution, SearchError> {
        self.state.time.start_search();
        info!(
            actions = self.sampler.catalog().len(),
            seed = ?self.state.config.seed,
            "starting MIO search"
        );
        while self.state.time.should_continue_search() {
            let before = self.state.time.evaluated_individuals();
            let outcome = self.iterate().await;
            if !self.state.conclude_iteration(outcome, before) {
                break;
            }
        }
        let solution = self.state.solution();
        log_finished(self.name(), &self.state, &solution);
        Ok(solution)
    }

    fn statistics(&self) -> &SearchStatistics {
        &self.state.stats
    }
}

/// Baseline: every evaluation is a fresh sample.
pub struct RandomSearch<F> {
    state: SearchState,
    sampler: Sampler,
    fitness: F,
}

impl<F: FitnessFunction> RandomSearch<F> {
    pub fn new(config: SearchConfig, catalog: ActionCatalog, fitness: F) -> Result<Self, SearchError> {
        let sampler = Sampler::new(catalog, &config)?;
        Ok(Self {
            state: SearchState::new(config)?,
            sampler,
            fitness,
        })
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn fitness(&self) -> &F {
        &self.fitness
    }
}

#[async_trait]
impl<F: FitnessFunction> SearchAlgorithm for RandomSearch<F> {
    fn name(&self) -> &'static str {
        "RandomSearch"
    }

    async fn search(&mut self) -> Result<Solution, SearchError> {
        self.state.time.start_search();
        while self.state.time.should_continue_search() {
            let before = self.state.time.evaluated_individuals();
            let outcome = sample_and_save(&mut self.state, &mut self.sampler, &mut self.fitness).await;
            if !self.state.conclude_iteration(outcome, before) {
                break;
            }
        }
        let solution = self.state.solution();
        log_finished(self.name(), &self.state, &solution);
        Ok(solution)
    }

    fn statistics(&self) -> &SearchStatistics {
        &self.state.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::Termination;
    use crate::test_utils::{items_catalog, FailingFitness, StubFitness};

    fn config(evaluations: u64) -> SearchConfig {
        SearchConfig {
            max_evaluations: evaluations,
            seed: Some(42),
            ..SearchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_mio_respects_budget() {
        let mut mio = MioAlgorithm::new(config(60), items_catalog(), StubFitness::by_action_names()).unwrap();
        let solution = mio.search().await.unwrap();
        assert_eq!(solution.termination, Termination::BudgetExhausted);
        assert_eq!(mio.statistics().evaluations, 60);
        assert_eq!(mio.fitness().evaluations(), 60);
        assert!(solution.coverage() > 0);
    }

    #[tokio::test]
    async fn test_fatal_fault_returns_partial_archive() {
        let mut mio = MioAlgorithm::new(config(100), items_catalog(), FailingFitness::after(5)).unwrap();
        let solution = mio.search().await.unwrap();
        assert!(matches!(solution.termination, Termination::Fatal(_)));
        assert_eq!(mio.statistics().evaluations, 5);
        assert!(solution.coverage() > 0);
    }

    #[tokio::test]
    async fn test_random_search_only_samples() {
        let mut random = RandomSearch::new(config(30), items_catalog(), StubFitness::by_action_names()).unwrap();
        random.search().await.unwrap();
        let stats = random.statistics();
        assert_eq!(stats.random_samples, 30);
        assert_eq!(stats.mutations, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = SearchConfig {
            prob_of_random_sampling: 2.0,
            ..SearchConfig::default()
        };
        assert!(matches!(
            MioAlgorithm::new(bad, items_catalog(), StubFitness::by_action_names()),
            Err(SearchError::ConfigError(_))
        ));
    }
}
