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

//! Creation of fresh individuals: random subsets of the catalog, or
//! externally supplied example calls.

use crate::action::{ActionCatalog, ActionCategory};
use crate::config::SearchConfig;
use crate::errors::SearchError;
use crate::individual::{Individual, SampleOrigin};
use crate::randomness::Randomness;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Random draws tried before giving up on a structurally valid sample.
pub const MAX_SAMPLING_ATTEMPTS: usize = 10;

/// One example call: a catalog action name and JSON values for some of its
/// parameters. Parameters left out keep a random value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCall {
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl SeedCall {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, param: impl Into<String>, value: Value) -> Self {
        self.params.insert(param.into(), value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Sampler {
    catalog: ActionCatalog,
    max_test_size: usize,
    prob_of_sampling_seeded: f64,
    seeds: VecDeque<Vec<SeedCall>>,
}

impl Sampler {
    /// Fails with [`SearchError::ConfigError`] when the catalog has no main
    /// action to sample from.
    pub fn new(catalog: ActionCatalog, config: &SearchConfig) -> Result<Self, SearchError> {
        if catalog.main_actions().is_empty() {
            return Err(SearchError::ConfigError("cannot sample from an empty action catalog".to_string()));
        }
        Ok(Self {
            catalog,
            max_test_size: config.max_test_size,
            prob_of_sampling_seeded: config.prob_of_sampling_seeded,
            seeds: VecDeque::new(),
        })
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    /// Queues an example test, used once by a later [`Sampler::sample`].
    pub fn add_seed(&mut self, calls: Vec<SeedCall>) {
        self.seeds.push_back(calls);
    }

    pub fn pending_seeds(&self) -> usize {
        self.seeds.len()
    }

    /// A queued seed with probability `prob_of_sampling_seeded`, otherwise a
    /// random individual.
    pub fn sample(&mut self, rng: &mut Randomness) -> Result<Individual, SearchError> {
        if !self.seeds.is_empty() && rng.next_bool(self.prob_of_sampling_seeded) {
            if let Some(calls) = self.seeds.pop_front() {
                return self.sample_seeded(&calls, rng);
            }
        }
        self.sample_at_random(rng)
    }

    /// A random subset of the main actions, each freshly randomized, repaired
    /// into a structurally valid sequence.
    pub fn sample_at_random(&self, rng: &mut Randomness) -> Result<Individual, SearchError> {
        let templates = self.catalog.main_actions();
        let upper = self.max_test_size.min(templates.len()).max(1);
        let mut last_error = None;

        for _ in 0..MAX_SAMPLING_ATTEMPTS {
            let n = rng.next_usize(1, upper);
            let mut actions = Vec::with_capacity(n);
            for i in rng.choose_indices(templates.len(), n) {
                let mut action = templates[i].clone();
                action.randomize(rng);
                actions.push(action);
            }
            let mut individual = Individual::new(Vec::new(), actions, SampleOrigin::Random);
            match individual.repair(&self.catalog, rng, self.max_test_size) {
                Ok(_) => return Ok(individual),
                Err(e) => {
                    debug!(error = %e, "random sample could not be repaired");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SearchError::StructuralError("sampling failed".to_string())))
    }

    /// Builds an individual from example calls. Environment actions go
    /// before the main sequence.
    pub fn sample_seeded(&self, calls: &[SeedCall], rng: &mut Randomness) -> Result<Individual, SearchError> {
        let mut env_actions = Vec::new();
        let mut main_actions = Vec::new();
        for call in calls {
            let mut action = self
                .catalog
                .get(&call.action)
                .cloned()
                .ok_or_else(|| SearchError::StructuralError(format!("seed refers to unknown action '{}'", call.action)))?;
            action.randomize(rng);
            for (name, value) in &call.params {
                let param = action
                    .params
                    .iter_mut()
                    .find(|p| &p.name == name)
                    .ok_or_else(|| SearchError::genotype(name, &format!("no such parameter on '{}'", call.action)))?;
                param.gene.set_from_json(value)?;
            }
            match action.category {
                ActionCategory::Environment => env_actions.push(action),
                ActionCategory::Main => main_actions.push(action),
            }
        }
        let mut individual = Individual::new(env_actions, main_actions, SampleOrigin::Seeded);
        individual.repair(&self.catalog, rng, self.max_test_size)?;
        Ok(individual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ParamKind};
    use crate::gene::Gene;
    use serde_json::json;

    fn catalog() -> ActionCatalog {
        ActionCatalog::new(vec![
            Action::rest("GET", "/items"),
            Action::rest("POST", "/items")
                .with_param(ParamKind::Body, Gene::object("body", vec![Gene::string("name", 1, 8), Gene::integer("qty")]))
                .producing("item"),
            Action::rest("DELETE", "/items/{id}")
                .with_param(ParamKind::Path, Gene::integer("id"))
                .requiring("item"),
        ])
        .unwrap()
    }

    #[test]
    fn test_random_samples_are_valid() {
        let sampler = Sampler::new(catalog(), &SearchConfig::default()).unwrap();
        let mut rng = Randomness::with_seed(11);
        for _ in 0..100 {
            let ind = sampler.sample_at_random(&mut rng).unwrap();
            assert!(ind.size() >= 1);
            assert!(ind.verify_structure(10).is_ok());
            assert!(ind.is_locally_valid());
            assert_eq!(ind.origin, SampleOrigin::Random);
        }
    }

    #[test]
    fn test_seeded_sample_binds_values() {
        let sampler = Sampler::new(catalog(), &SearchConfig::default()).unwrap();
        let mut rng = Randomness::with_seed(2);
        let ind = sampler
            .sample_seeded(
                &[SeedCall::new("POST /items").with("body", json!({"name": "pen", "qty": 3}))],
                &mut rng,
            )
            .unwrap();
        assert_eq!(ind.origin, SampleOrigin::Seeded);
        assert_eq!(ind.main_actions[0].params[0].gene.to_json(), json!({"name": "pen", "qty": 3}));
    }

    #[test]
    fn test_bad_seed_is_not_fatal() {
        let sampler = Sampler::new(catalog(), &SearchConfig::default()).unwrap();
        let mut rng = Randomness::with_seed(2);
        let unknown = sampler.sample_seeded(&[SeedCall::new("PATCH /nothing")], &mut rng).unwrap_err();
        assert!(!unknown.is_fatal());
        let wrong_type = sampler
            .sample_seeded(&[SeedCall::new("DELETE /items/{id}").with("id", json!("abc"))], &mut rng)
            .unwrap_err();
        assert!(matches!(wrong_type, SearchError::GenotypeError { .. }));
    }

    #[test]
    fn test_seeds_are_consumed() {
        let config = SearchConfig {
            prob_of_sampling_seeded: 1.0,
            ..SearchConfig::default()
        };
        let mut sampler = Sampler::new(catalog(), &config).unwrap();
        sampler.add_seed(vec![SeedCall::new("GET /items")]);
        let mut rng = Randomness::with_seed(5);
        assert_eq!(sampler.sample(&mut rng).unwrap().origin, SampleOrigin::Seeded);
        assert_eq!(sampler.pending_seeds(), 0);
        assert_eq!(sampler.sample(&mut rng).unwrap().origin, SampleOrigin::Random);
    }

    #[test]
    fn test_empty_catalog_fails_fast() {
        let err = Sampler::new(ActionCatalog::default(), &SearchConfig::default()).unwrap_err();
        assert!(err.is_fatal());
    }
}
