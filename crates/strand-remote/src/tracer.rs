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

//! Collects target heuristics on the side of the system under test.

use crate::dto::{ExtraHeuristicsDto, HeuristicEntryDto, TargetInfoDto, TestResultsDto};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
struct Objective {
    id: i32,
    value: f64,
    action_index: i32,
}

/// Heuristics reported since the last reset. Numeric ids are stable for
/// the whole search; values restart from zero on every reset.
#[derive(Debug, Default)]
pub struct ExecutionTracer {
    ids: BTreeMap<String, i32>,
    objectives: BTreeMap<String, Objective>,
    extra: Vec<HeuristicEntryDto>,
    current_action: Option<usize>,
}

impl ExecutionTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears what was collected for the previous test.
    pub fn reset(&mut self) {
        self.objectives.clear();
        self.extra.clear();
        self.current_action = None;
    }

    /// Forgets everything, numeric ids included.
    pub fn reset_search(&mut self) {
        self.reset();
        self.ids.clear();
    }

    pub fn set_action(&mut self, index: usize) {
        self.current_action = Some(index);
    }

    pub fn current_action(&self) -> Option<usize> {
        self.current_action
    }

    /// Records a heuristic in `[0, 1]` for a target, keeping the best seen
    /// since the last reset.
    pub fn update_objective(&mut self, descriptive_id: &str, value: f64) {
        let value = value.clamp(0.0, 1.0);
        let next_id = self.ids.len() as i32;
        let id = *self.ids.entry(descriptive_id.to_string()).or_insert(next_id);
        let action_index = self.current_action.map_or(-1, |i| i as i32);
        let entry = self.objectives.entry(descriptive_id.to_string()).or_insert(Objective {
            id,
            value: 0.0,
            action_index,
        });
        if value > entry.value {
            entry.value = value;
            entry.action_index = action_index;
        }
    }

    pub fn add_extra_heuristic(&mut self, entry: HeuristicEntryDto) {
        self.extra.push(entry);
    }

    pub fn objective(&self, descriptive_id: &str) -> Option<f64> {
        self.objectives.get(descriptive_id).map(|o| o.value)
    }

    /// Results restricted to `ids`, every target when `ids` is empty.
    pub fn snapshot(&self, ids: &BTreeSet<i32>) -> TestResultsDto {
        let targets = self
            .objectives
            .iter()
            .filter(|(_, o)| ids.is_empty() || ids.contains(&o.id))
            .map(|(name, o)| TargetInfoDto {
                id: o.id,
                descriptive_id: Some(name.clone()),
                value: o.value,
                action_index: o.action_index,
            })
            .collect();
        let extra_heuristics = if self.extra.is_empty() {
            Vec::new()
        } else {
            vec![ExtraHeuristicsDto {
                heuristics: self.extra.clone(),
            }]
        };
        TestResultsDto {
            targets,
            additional_info_list: Vec::new(),
            extra_heuristics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_best_value_and_its_action() {
        let mut tracer = ExecutionTracer::new();
        tracer.set_action(0);
        tracer.update_objective("Branch_1", 0.4);
        tracer.set_action(1);
        tracer.update_objective("Branch_1", 0.2);
        tracer.update_objective("Branch_2", 1.5);

        let results = tracer.snapshot(&BTreeSet::new());
        assert_eq!(results.targets.len(), 2);
        let b1 = &results.targets[0];
        assert_eq!((b1.value, b1.action_index), (0.4, 0));
        assert_eq!(results.targets[1].value, 1.0);
    }

    #[test]
    fn test_ids_survive_a_reset() {
        let mut tracer = ExecutionTracer::new();
        tracer.update_objective("a", 0.1);
        tracer.update_objective("b", 0.1);
        tracer.reset();
        assert_eq!(tracer.objective("a"), None);
        tracer.update_objective("b", 0.3);
        let results = tracer.snapshot(&BTreeSet::from([1]));
        assert_eq!(results.targets.len(), 1);
        assert_eq!(results.targets[0].id, 1);
        assert_eq!(results.targets[0].action_index, -1);

        tracer.reset_search();
        tracer.update_objective("b", 0.3);
        assert_eq!(tracer.snapshot(&BTreeSet::new()).targets[0].id, 0);
    }
}
