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

//! Search budget bookkeeping.
//!
//! Polled cooperatively by the driver at the top of every iteration and after
//! every evaluation; nothing here interrupts an in-flight call.

use crate::config::{SearchConfig, StoppingCriterion};
use crate::statistics::Termination;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SearchTimeController {
    criterion: StoppingCriterion,
    max_evaluations: u64,
    max_time: Duration,
    stop_when_no_improvement: Option<u64>,
    started_at: Option<Instant>,
    evaluated_individuals: u64,
    evaluated_actions: u64,
    last_improvement_at: u64,
    last_covered_at: u64,
    improvement_events: u64,
    covered_events: u64,
    fatal: Option<String>,
}

impl SearchTimeController {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            criterion: config.stopping_criterion,
            max_evaluations: config.max_evaluations,
            max_time: config.max_time(),
            stop_when_no_improvement: config.stop_when_no_improvement,
            started_at: None,
            evaluated_individuals: 0,
            evaluated_actions: 0,
            last_improvement_at: 0,
            last_covered_at: 0,
            improvement_events: 0,
            covered_events: 0,
            fatal: None,
        }
    }

    /// Starts the clock. Idempotent.
    pub fn start_search(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn evaluated_individuals(&self) -> u64 {
        self.evaluated_individuals
    }

    pub fn evaluated_actions(&self) -> u64 {
        self.evaluated_actions
    }

    pub fn covered_events(&self) -> u64 {
        self.covered_events
    }

    pub fn improvement_events(&self) -> u64 {
        self.improvement_events
    }

    pub fn new_individual_evaluated(&mut self, actions: usize) {
        self.evaluated_individuals += 1;
        self.evaluated_actions += actions as u64;
        if self.stop_when_no_improvement == Some(self.evaluations_since_last_improvement()) && self.budget_left() {
            info!(
                evaluations = self.evaluated_individuals,
                "stopping early, no improvement"
            );
        }
    }

    pub fn new_action_improvement(&mut self) {
        self.improvement_events += 1;
        self.last_improvement_at = self.evaluated_individuals;
    }

    pub fn new_covered_target(&mut self) {
        self.covered_events += 1;
        self.last_covered_at = self.evaluated_individuals;
    }

    /// Evaluations since the last improvement of any target.
    pub fn evaluations_since_last_improvement(&self) -> u64 {
        self.evaluated_individuals - self.last_improvement_at
    }

    /// Fraction of the budget used, in `[0, 1]`.
    pub fn percentage_used_budget(&self) -> f64 {
        let used = match self.criterion {
            StoppingCriterion::FitnessEvaluations => {
                if self.max_evaluations == 0 {
                    return 1.0;
                }
                self.evaluated_individuals as f64 / self.max_evaluations as f64
            }
            StoppingCriterion::Time => {
                if self.max_time.is_zero() {
                    return 1.0;
                }
                self.elapsed().as_secs_f64() / self.max_time.as_secs_f64()
            }
        };
        used.clamp(0.0, 1.0)
    }

    fn budget_left(&self) -> bool {
        match self.criterion {
            StoppingCriterion::FitnessEvaluations => self.evaluated_individuals < self.max_evaluations,
            StoppingCriterion::Time => self.elapsed() < self.max_time,
        }
    }

    fn stalled(&self) -> bool {
        self.stop_when_no_improvement
            .is_some_and(|n| self.evaluations_since_last_improvement() >= n)
    }

    pub fn should_continue_search(&self) -> bool {
        self.fatal.is_none() && self.budget_left() && !self.stalled()
    }

    /// Records the cause of a fatal fault; the search stops at the next poll.
    pub fn record_fatal(&mut self, cause: impl Into<String>) {
        let cause = cause.into();
        warn!(cause = %cause, "search aborted");
        self.fatal = Some(cause);
    }

    pub fn fatal_cause(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// Why the search stopped (or would stop now).
    pub fn termination(&self) -> Termination {
        if let Some(cause) = &self.fatal {
            return Termination::Fatal(cause.clone());
        }
        if self.stalled() && self.budget_left() {
            return Termination::NoImprovement;
        }
        Termination::BudgetExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(max_evaluations: u64) -> SearchTimeController {
        SearchTimeController::new(&SearchConfig {
            max_evaluations,
            ..SearchConfig::default()
        })
    }

    #[test]
    fn test_evaluation_budget() {
        let mut time = controller(4);
        time.start_search();
        for i in 0..4 {
            assert!(time.should_continue_search());
            assert!((time.percentage_used_budget() - i as f64 / 4.0).abs() < 1e-12);
            time.new_individual_evaluated(2);
        }
        assert!(!time.should_continue_search());
        assert_eq!(time.evaluated_actions(), 8);
        assert_eq!(time.termination(), Termination::BudgetExhausted);
    }

    #[test]
    fn test_no_improvement_stop() {
        let mut time = SearchTimeController::new(&SearchConfig {
            max_evaluations: 100,
            stop_when_no_improvement: Some(3),
            ..SearchConfig::default()
        });
        time.new_individual_evaluated(1);
        time.new_action_improvement();
        time.new_individual_evaluated(1);
        time.new_individual_evaluated(1);
        assert!(time.should_continue_search());
        time.new_individual_evaluated(1);
        assert!(!time.should_continue_search());
        assert_eq!(time.termination(), Termination::NoImprovement);
        assert_eq!(time.termination(), Termination::NoImprovement);
        assert_eq!(time.evaluated_individuals(), 4);
    }

    #[test]
    fn test_fatal_stops_search() {
        let mut time = controller(100);
        time.record_fatal("connection refused");
        assert!(!time.should_continue_search());
        assert_eq!(time.termination(), Termination::Fatal("connection refused".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_budget() {
        let mut time = SearchTimeController::new(&SearchConfig {
            stopping_criterion: StoppingCriterion::Time,
            max_time_seconds: 10,
            ..SearchConfig::default()
        });
        time.start_search();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!((time.percentage_used_budget() - 0.5).abs() < 0.01);
        assert!(time.should_continue_search());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!time.should_continue_search());
    }
}
