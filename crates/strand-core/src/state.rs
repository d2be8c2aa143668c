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

//! Mutable state of one search run.
//!
//! Owned by the driver for the whole run; nothing in here is shared or locked.

use crate::archive::{Archive, ArchiveUpdate};
use crate::config::SearchConfig;
use crate::errors::SearchError;
use crate::fitness::{EvaluatedIndividual, FitnessFunction};
use crate::individual::Individual;
use crate::parameters::{AdaptiveParameterControl, Phase};
use crate::randomness::Randomness;
use crate::statistics::{SearchStatistics, Solution};
use crate::time::SearchTimeController;
use tracing::{debug, error, info, warn};

/// Iterations in a row that may end without evaluating anything before the
/// run is aborted.
pub const MAX_CONSECUTIVE_BARREN_ITERATIONS: u32 = 100;

#[derive(Debug)]
pub struct SearchState {
    pub config: SearchConfig,
    pub archive: Archive,
    pub time: SearchTimeController,
    pub apc: AdaptiveParameterControl,
    pub stats: SearchStatistics,
    pub rng: Randomness,
    phase: Phase,
    barren_iterations: u32,
}

impl SearchState {
    /// Validates `config` and seeds the random source (from entropy when no
    /// seed is configured).
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => Randomness::with_seed(seed),
            None => Randomness::from_entropy(),
        };
        Ok(Self {
            archive: Archive::new(config.archive_tie_break, config.feedback_directed_sampling),
            time: SearchTimeController::new(&config),
            apc: AdaptiveParameterControl::new(&config),
            stats: SearchStatistics::default(),
            rng,
            phase: Phase::Exploration,
            barren_iterations: 0,
            config,
        })
    }

    pub fn used_budget(&self) -> f64 {
        self.time.percentage_used_budget()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Recomputes the phase, logging the switch to focused search once.
    pub fn update_phase(&mut self) -> Phase {
        let phase = self.apc.phase(self.used_budget());
        if phase != self.phase {
            info!(
                evaluations = self.time.evaluated_individuals(),
                covered = self.archive.number_of_covered_targets(),
                "starting focused search"
            );
            self.phase = phase;
        }
        phase
    }

    pub fn archive_target_limit(&self) -> usize {
        self.apc.archive_target_limit(self.used_budget())
    }

    /// Evaluates one individual and charges it to the budget.
    ///
    /// Non-fatal faults are counted and yield `Ok(None)`; fatal ones are
    /// recorded on the time controller and returned.
    pub async fn evaluate<F>(
        &mut self,
        fitness: &mut F,
        individual: &Individual,
    ) -> Result<Option<EvaluatedIndividual>, SearchError>
    where
        F: FitnessFunction + ?Sized,
    {
        let outcome = fitness.evaluate(individual).await;
        self.time.new_individual_evaluated(individual.size());
        match outcome {
            Ok(ei) => {
                self.stats.record_evaluation(&ei);
                Ok(Some(ei))
            }
            Err(e) if e.is_fatal() => {
                self.time.record_fatal(e.to_string());
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "evaluation failed");
                self.stats.evaluations += 1;
                self.stats.record_error(&e);
                Ok(None)
            }
        }
    }

    /// Offers `ei` to the archive under the current capacity and reports
    /// improvements to the time controller.
    pub fn save(&mut self, ei: &EvaluatedIndividual) -> ArchiveUpdate {
        let limit = self.archive_target_limit();
        let update = self.archive.add_if_needed(ei, limit);
        for target in &update.newly_covered {
            debug!(target = %target, evaluations = self.time.evaluated_individuals(), "new covered target");
            self.time.new_covered_target();
        }
        if update.any_improvement() {
            self.time.new_action_improvement();
        }
        update
    }

    /// Applies the outcome of one driver iteration. Returns `false` when the
    /// run must stop: on a fatal fault, or after too many iterations in a row
    /// that evaluated nothing.
    pub fn conclude_iteration(&mut self, outcome: Result<(), SearchError>, evaluations_before: u64) -> bool {
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                if self.time.fatal_cause().is_none() {
                    self.time.record_fatal(e.to_string());
                }
                error!(error = %e, "fatal fault, returning partial archive");
                return false;
            }
            Err(e) => {
                debug!(error = %e, "iteration discarded");
                self.stats.record_error(&e);
            }
        }
        if self.time.evaluated_individuals() > evaluations_before {
            self.barren_iterations = 0;
            return true;
        }
        self.barren_iterations += 1;
        if self.barren_iterations >= MAX_CONSECUTIVE_BARREN_ITERATIONS {
            self.time.record_fatal(format!(
                "no individual could be evaluated in {} iterations",
                self.barren_iterations
            ));
            return false;
        }
        true
    }

    /// The archive content, with the reason the run stopped.
    pub fn solution(&self) -> Solution {
        self.archive.extract_solution(self.time.termination())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::Termination;

    fn state() -> SearchState {
        SearchState::new(SearchConfig {
            seed: Some(1),
            ..SearchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_fatal_outcome_stops_the_run() {
        let mut state = state();
        let keep_going = state.conclude_iteration(Err(SearchError::ConnectionLost("refused".into())), 0);
        assert!(!keep_going);
        assert!(matches!(state.time.termination(), Termination::Fatal(_)));
    }

    #[test]
    fn test_non_fatal_outcome_is_counted() {
        let mut state = state();
        assert!(state.conclude_iteration(Err(SearchError::StructuralError("loop".into())), 0));
        assert_eq!(state.stats.discarded_structural, 1);
    }

    #[test]
    fn test_barren_iterations_abort() {
        let mut state = state();
        for _ in 1..MAX_CONSECUTIVE_BARREN_ITERATIONS {
            assert!(state.conclude_iteration(Ok(()), 0));
        }
        assert!(!state.conclude_iteration(Ok(()), 0));
        assert!(state.time.fatal_cause().is_some());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SearchConfig {
            max_evaluations: 0,
            ..SearchConfig::default()
        };
        assert!(matches!(SearchState::new(config), Err(SearchError::ConfigError(_))));
    }
}
