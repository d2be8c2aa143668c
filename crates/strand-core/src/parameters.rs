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

//! Time-based schedule of the MIO parameters.
//!
//! During exploration each parameter moves linearly from its start value
//! towards its focused value as the used budget approaches
//! `focused_search_activation_time`; from there on the focused value is used.

use crate::config::SearchConfig;
use serde::{Deserialize, Serialize};

/// Phase of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Exploration,
    Focused,
}

/// Probability of random sampling once focused search starts.
pub const FOCUSED_PROB_OF_RANDOM_SAMPLING: f64 = 0.0;

/// Archive population size once focused search starts.
pub const FOCUSED_ARCHIVE_TARGET_LIMIT: usize = 1;

#[derive(Debug, Clone)]
pub struct AdaptiveParameterControl {
    focus_threshold: f64,
    start_prob_random: f64,
    start_limit: usize,
    start_mutations: usize,
    end_mutations: usize,
}

impl AdaptiveParameterControl {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            focus_threshold: config.focused_search_activation_time,
            start_prob_random: config.prob_of_random_sampling,
            start_limit: config.archive_target_limit,
            start_mutations: config.start_number_of_mutations,
            end_mutations: config.end_number_of_mutations,
        }
    }

    pub fn phase(&self, used_budget: f64) -> Phase {
        if used_budget >= self.focus_threshold {
            Phase::Focused
        } else {
            Phase::Exploration
        }
    }

    /// Progress towards focused search, in `[0, 1]`.
    fn progress(&self, used_budget: f64) -> f64 {
        if self.focus_threshold <= 0.0 {
            return 1.0;
        }
        (used_budget / self.focus_threshold).clamp(0.0, 1.0)
    }

    fn interpolate(&self, start: f64, end: f64, used_budget: f64) -> f64 {
        start + (end - start) * self.progress(used_budget)
    }

    pub fn prob_of_random_sampling(&self, used_budget: f64) -> f64 {
        self.interpolate(self.start_prob_random, FOCUSED_PROB_OF_RANDOM_SAMPLING, used_budget)
    }

    pub fn archive_target_limit(&self, used_budget: f64) -> usize {
        let limit = self.interpolate(
            self.start_limit as f64,
            FOCUSED_ARCHIVE_TARGET_LIMIT as f64,
            used_budget,
        );
        (limit.round() as usize).max(1)
    }

    pub fn number_of_mutations(&self, used_budget: f64) -> usize {
        let n = self.interpolate(self.start_mutations as f64, self.end_mutations as f64, used_budget);
        (n.round() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_endpoints() {
        let apc = AdaptiveParameterControl::new(&SearchConfig::default());
        assert_eq!(apc.phase(0.0), Phase::Exploration);
        assert_eq!(apc.prob_of_random_sampling(0.0), 0.5);
        assert_eq!(apc.archive_target_limit(0.0), 10);
        assert_eq!(apc.number_of_mutations(0.0), 1);

        assert_eq!(apc.phase(0.8), Phase::Focused);
        assert_eq!(apc.prob_of_random_sampling(0.9), 0.0);
        assert_eq!(apc.archive_target_limit(0.9), 1);
        assert_eq!(apc.number_of_mutations(1.0), 10);
    }

    #[test]
    fn test_schedule_is_monotonic() {
        let apc = AdaptiveParameterControl::new(&SearchConfig::default());
        let mut previous_limit = usize::MAX;
        let mut previous_prob = f64::MAX;
        for step in 0..=20 {
            let used = step as f64 / 20.0;
            let limit = apc.archive_target_limit(used);
            let prob = apc.prob_of_random_sampling(used);
            assert!(limit <= previous_limit);
            assert!(prob <= previous_prob);
            previous_limit = limit;
            previous_prob = prob;
        }
    }

    #[test]
    fn test_zero_threshold_starts_focused() {
        let apc = AdaptiveParameterControl::new(&SearchConfig {
            focused_search_activation_time: 0.0,
            ..SearchConfig::default()
        });
        assert_eq!(apc.phase(0.0), Phase::Focused);
        assert_eq!(apc.archive_target_limit(0.0), 1);
    }
}
