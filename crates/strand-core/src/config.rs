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

//! Search configuration.

use crate::archive::{ArchiveTieBreak, TargetSelection};
use crate::errors::SearchError;
use crate::impact::GeneSelectionMethod;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default configuration values
pub mod defaults {
    /// Maximum number of main actions in a test
    pub const MAX_TEST_SIZE: usize = 10;

    /// Fraction of the budget after which focused search starts
    pub const FOCUSED_SEARCH_ACTIVATION_TIME: f64 = 0.8;

    /// Probability of sampling a fresh individual at the start of the search
    pub const PROB_OF_RANDOM_SAMPLING: f64 = 0.5;

    /// Per-target population size at the start of the search
    pub const ARCHIVE_TARGET_LIMIT: usize = 10;

    /// Consecutive mutations per sampled parent, start and end of the schedule
    pub const START_NUMBER_OF_MUTATIONS: usize = 1;
    pub const END_NUMBER_OF_MUTATIONS: usize = 10;

    pub const STRUCTURE_MUTATION_PROBABILITY: f64 = 0.5;

    /// Probability of preferring a queued seed over random sampling
    pub const PROB_OF_SAMPLING_SEEDED: f64 = 0.5;

    pub const MAX_EVALUATIONS: u64 = 1_000;

    pub const MAX_TIME_SECONDS: u64 = 60;

    /// Controller faults in a row before the connection is considered lost
    pub const MAX_CONSECUTIVE_CONTROLLER_FAILURES: u32 = 5;

    pub const CONTROLLER_RETRY_ATTEMPTS: u32 = 3;

    pub const CONTROLLER_RETRY_BACKOFF_MS: u64 = 200;

    pub const ACTION_TIMEOUT_MS: u64 = 10_000;
}

/// What the search budget is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoppingCriterion {
    FitnessEvaluations,
    Time,
}

/// Configuration for one search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub stopping_criterion: StoppingCriterion,
    /// Budget when stopping on fitness evaluations
    pub max_evaluations: u64,
    /// Budget when stopping on time
    pub max_time_seconds: u64,
    /// Seed for the run's single random generator; `None` seeds from entropy
    pub seed: Option<u64>,
    pub max_test_size: usize,
    pub focused_search_activation_time: f64,
    pub prob_of_random_sampling: f64,
    pub archive_target_limit: usize,
    pub start_number_of_mutations: usize,
    pub end_number_of_mutations: usize,
    pub structure_mutation_probability: f64,
    pub prob_of_sampling_seeded: f64,
    pub archive_tie_break: ArchiveTieBreak,
    pub feedback_directed_sampling: TargetSelection,
    /// `None` disables impact learning
    pub gene_selection_method: GeneSelectionMethod,
    /// Stop after this many evaluations without improvement
    pub stop_when_no_improvement: Option<u64>,
    pub max_consecutive_controller_failures: u32,
    pub controller_retry_attempts: u32,
    pub controller_retry_backoff_ms: u64,
    pub action_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            stopping_criterion: StoppingCriterion::FitnessEvaluations,
            max_evaluations: defaults::MAX_EVALUATIONS,
            max_time_seconds: defaults::MAX_TIME_SECONDS,
            seed: None,
            max_test_size: defaults::MAX_TEST_SIZE,
            focused_search_activation_time: defaults::FOCUSED_SEARCH_ACTIVATION_TIME,
            prob_of_random_sampling: defaults::PROB_OF_RANDOM_SAMPLING,
            archive_target_limit: defaults::ARCHIVE_TARGET_LIMIT,
            start_number_of_mutations: defaults::START_NUMBER_OF_MUTATIONS,
            end_number_of_mutations: defaults::END_NUMBER_OF_MUTATIONS,
            structure_mutation_probability: defaults::STRUCTURE_MUTATION_PROBABILITY,
            prob_of_sampling_seeded: defaults::PROB_OF_SAMPLING_SEEDED,
            archive_tie_break: ArchiveTieBreak::default(),
            feedback_directed_sampling: TargetSelection::default(),
            gene_selection_method: GeneSelectionMethod::default(),
            stop_when_no_improvement: None,
            max_consecutive_controller_failures: defaults::MAX_CONSECUTIVE_CONTROLLER_FAILURES,
            controller_retry_attempts: defaults::CONTROLLER_RETRY_ATTEMPTS,
            controller_retry_backoff_ms: defaults::CONTROLLER_RETRY_BACKOFF_MS,
            action_timeout_ms: defaults::ACTION_TIMEOUT_MS,
        }
    }
}

impl SearchConfig {
    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_seconds)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Rejects invalid budgets and probabilities.
    pub fn validate(&self) -> Result<(), SearchError> {
        let probabilities = [
            ("focused_search_activation_time", self.focused_search_activation_time),
            ("prob_of_random_sampling", self.prob_of_random_sampling),
            ("structure_mutation_probability", self.structure_mutation_probability),
            ("prob_of_sampling_seeded", self.prob_of_sampling_seeded),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SearchError::ConfigError(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        let budget = match self.stopping_criterion {
            StoppingCriterion::FitnessEvaluations => self.max_evaluations,
            StoppingCriterion::Time => self.max_time_seconds,
        };
        if budget == 0 {
            return Err(SearchError::ConfigError("search budget must be positive".to_string()));
        }
        if self.max_test_size == 0 {
            return Err(SearchError::ConfigError("max_test_size must be at least 1".to_string()));
        }
        if self.archive_target_limit == 0 {
            return Err(SearchError::ConfigError("archive_target_limit must be at least 1".to_string()));
        }
        if self.start_number_of_mutations == 0 || self.end_number_of_mutations == 0 {
            return Err(SearchError::ConfigError("number of mutations must be at least 1".to_string()));
        }
        if self.max_consecutive_controller_failures == 0 {
            return Err(SearchError::ConfigError(
                "max_consecutive_controller_failures must be at least 1".to_string(),
            ));
        }
        if self.stop_when_no_improvement == Some(0) {
            return Err(SearchError::ConfigError("stop_when_no_improvement must be positive".to_string()));
        }
        Ok(())
    }
}
