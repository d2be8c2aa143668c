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

//! Fitness values, evaluated individuals and the evaluation contract.

use crate::errors::SearchError;
use crate::heuristics::{clamp_heuristic, distance_to_heuristic};
use crate::individual::Individual;
use crate::types::TargetId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Heuristic value of a covered target.
pub const MAX_VALUE: f64 = 1.0;

/// Best heuristic seen for one target during one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heuristic {
    pub score: f64,
    /// Index of the main action that produced `score`, when known.
    pub action_index: Option<usize>,
}

/// Per-target heuristics of one evaluation, plus secondary objectives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessValue {
    targets: BTreeMap<TargetId, Heuristic>,
    /// Raw extra distances (e.g. SQL predicates), `0` meaning satisfied.
    pub extra_distances: Vec<f64>,
    /// Number of main actions of the evaluated individual.
    pub size: usize,
}

impl FitnessValue {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Records `score` for `target`, keeping the best value seen.
    pub fn update_target(&mut self, target: impl Into<TargetId>, score: f64, action_index: Option<usize>) {
        let score = clamp_heuristic(score);
        let target = target.into();
        match self.targets.get(&target) {
            Some(existing) if existing.score >= score => {}
            _ => {
                self.targets.insert(target, Heuristic { score, action_index });
            }
        }
    }

    /// `0.0` for targets never reached.
    pub fn heuristic(&self, target: &TargetId) -> f64 {
        self.targets.get(target).map_or(0.0, |h| h.score)
    }

    pub fn action_index(&self, target: &TargetId) -> Option<usize> {
        self.targets.get(target).and_then(|h| h.action_index)
    }

    pub fn covers(&self, target: &TargetId) -> bool {
        self.heuristic(target) >= MAX_VALUE
    }

    pub fn targets(&self) -> impl Iterator<Item = (&TargetId, &Heuristic)> {
        self.targets.iter()
    }

    /// Targets with a heuristic above zero.
    pub fn reached_targets(&self) -> impl Iterator<Item = &TargetId> {
        self.targets.iter().filter(|(_, h)| h.score > 0.0).map(|(t, _)| t)
    }

    pub fn covered_targets(&self) -> impl Iterator<Item = &TargetId> {
        self.targets.iter().filter(|(_, h)| h.score >= MAX_VALUE).map(|(t, _)| t)
    }

    pub fn covered_count(&self) -> usize {
        self.covered_targets().count()
    }

    /// Sum of all target heuristics.
    pub fn compute_fitness_score(&self) -> f64 {
        self.targets.values().map(|h| h.score).sum()
    }

    /// Mean of the extra distances turned into `[0, 1]` heuristics.
    pub fn extra_heuristic(&self) -> f64 {
        if self.extra_distances.is_empty() {
            return 0.0;
        }
        let total: f64 = self.extra_distances.iter().map(|d| distance_to_heuristic(*d)).sum();
        total / self.extra_distances.len() as f64
    }

    /// Strictly better on `target`; equal scores fall back to the extra heuristic.
    pub fn better_than(&self, other: &FitnessValue, target: &TargetId) -> bool {
        let (mine, theirs) = (self.heuristic(target), other.heuristic(target));
        if mine != theirs {
            return mine > theirs;
        }
        self.extra_heuristic() > other.extra_heuristic()
    }

    /// Same score on `target` and same secondary objective.
    pub fn equivalent(&self, other: &FitnessValue, target: &TargetId) -> bool {
        self.heuristic(target) == other.heuristic(target) && self.extra_heuristic() == other.extra_heuristic()
    }

    /// At least as good as `other` on every target in `targets`.
    pub fn subsumes(&self, other: &FitnessValue, targets: &BTreeSet<TargetId>) -> bool {
        targets.iter().all(|t| self.heuristic(t) >= other.heuristic(t))
    }

    /// Targets (out of `targets`) whose heuristic differs from `previous`,
    /// and the subset that improved.
    pub fn differences(
        &self,
        previous: &FitnessValue,
        targets: &BTreeSet<TargetId>,
    ) -> (BTreeSet<TargetId>, BTreeSet<TargetId>) {
        let mut impacted = BTreeSet::new();
        let mut improved = BTreeSet::new();
        for target in targets {
            let (now, before) = (self.heuristic(target), previous.heuristic(target));
            if now != before {
                impacted.insert(target.clone());
            }
            if now > before {
                improved.insert(target.clone());
            }
        }
        (impacted, improved)
    }

    pub fn is_different(&self, previous: &FitnessValue, targets: &BTreeSet<TargetId>) -> bool {
        targets.iter().any(|t| self.heuristic(t) != previous.heuristic(t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Executed,
    /// Unexpected status, malformed response or transport error.
    Failed,
    TimedOut,
    /// Skipped because an earlier action failed.
    NotExecuted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Index into the main sequence.
    pub index: usize,
    pub status: ActionStatus,
    pub status_code: Option<u16>,
    pub message: Option<String>,
}

impl ActionResult {
    pub fn executed(index: usize, status_code: Option<u16>) -> Self {
        Self {
            index,
            status: ActionStatus::Executed,
            status_code,
            message: None,
        }
    }

    pub fn not_executed(index: usize) -> Self {
        Self {
            index,
            status: ActionStatus::NotExecuted,
            status_code: None,
            message: None,
        }
    }
}

/// An individual together with the outcome of its evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedIndividual {
    pub individual: Individual,
    pub fitness: FitnessValue,
    pub results: Vec<ActionResult>,
    pub execution_time_ms: u64,
}

impl EvaluatedIndividual {
    pub fn new(individual: Individual, fitness: FitnessValue, results: Vec<ActionResult>) -> Self {
        Self {
            individual,
            fitness,
            results,
            execution_time_ms: 0,
        }
    }

    pub fn failed_actions(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ActionStatus::Failed | ActionStatus::TimedOut))
            .count()
    }

    pub fn timed_out_actions(&self) -> usize {
        self.results.iter().filter(|r| r.status == ActionStatus::TimedOut).count()
    }
}

/// Runs an individual against the system under test.
///
/// Action-level failures are reported inside the returned
/// [`EvaluatedIndividual`]; only connection-level faults surface as errors.
#[async_trait]
pub trait FitnessFunction: Send {
    async fn evaluate(&mut self, individual: &Individual) -> Result<EvaluatedIndividual, SearchError>;
}
