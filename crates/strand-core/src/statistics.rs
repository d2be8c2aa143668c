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

//! Run statistics and the final solution.

use crate::errors::SearchError;
use crate::fitness::EvaluatedIndividual;
use crate::types::TargetId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Why a search stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    BudgetExhausted,
    NoImprovement,
    /// A fatal fault aborted the run; the archive content is still returned.
    Fatal(String),
}

/// Counters of everything that happened during a run.
///
/// Non-fatal faults never stop the search; they are counted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStatistics {
    pub evaluations: u64,
    pub evaluated_actions: u64,
    pub random_samples: u64,
    pub seeded_samples: u64,
    pub mutations: u64,
    pub structural_mutations: u64,
    pub kept_mutants: u64,
    pub failed_actions: u64,
    pub timed_out_actions: u64,
    pub repairs: u64,
    pub discarded_structural: u64,
    pub discarded_genotype: u64,
    pub non_fatal_errors: u64,
}

impl SearchStatistics {
    pub fn record_evaluation(&mut self, ei: &EvaluatedIndividual) {
        self.evaluations += 1;
        self.evaluated_actions += ei.individual.size() as u64;
        self.failed_actions += ei.failed_actions() as u64;
        self.timed_out_actions += ei.timed_out_actions() as u64;
    }

    /// Counts a non-fatal error by its class.
    pub fn record_error(&mut self, error: &SearchError) {
        match error {
            SearchError::StructuralError(_) => self.discarded_structural += 1,
            SearchError::GenotypeError { .. } => self.discarded_genotype += 1,
            SearchError::ActionFailed { .. } => self.failed_actions += 1,
            _ => self.non_fatal_errors += 1,
        }
    }
}

/// What a search hands back: the test suite and how it went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Covering individuals, without duplicates.
    pub individuals: Vec<EvaluatedIndividual>,
    pub covered_targets: BTreeSet<TargetId>,
    /// Best heuristic of every reached target.
    pub best_heuristics: BTreeMap<TargetId, f64>,
    pub termination: Termination,
}

impl Solution {
    pub fn coverage(&self) -> usize {
        self.covered_targets.len()
    }

    /// Short human-readable summary.
    pub fn report(&self, stats: &SearchStatistics) -> String {
        format!(
            "Search finished ({:?})\n\
             Tests: {}\n\
             Covered targets: {} of {} reached\n\
             Evaluations: {} ({} actions, {} failed, {} timed out)\n\
             Mutants kept: {} of {}\n\
             Discarded candidates: {} structural, {} genotype",
            self.termination,
            self.individuals.len(),
            self.covered_targets.len(),
            self.best_heuristics.len(),
            stats.evaluations,
            stats.evaluated_actions,
            stats.failed_actions,
            stats.timed_out_actions,
            stats.kept_mutants,
            stats.mutations,
            stats.discarded_structural,
            stats.discarded_genotype,
        )
    }
}
