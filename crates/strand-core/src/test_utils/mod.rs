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

//! Deterministic fitness stubs and small catalogs for tests.

use crate::action::{Action, ActionCatalog, ParamKind};
use crate::errors::SearchError;
use crate::fitness::{ActionResult, EvaluatedIndividual, FitnessFunction, FitnessValue};
use crate::gene::Gene;
use crate::heuristics::equality_heuristic;
use crate::individual::Individual;
use async_trait::async_trait;

/// Scoring function of a [`StubFitness`].
pub type Scorer = fn(&Individual, &mut FitnessValue);

/// One action, `GET /items`, without parameters.
pub fn single_get_catalog() -> ActionCatalog {
    ActionCatalog::new(vec![Action::rest("GET", "/items")]).unwrap_or_default()
}

/// A small item API: listing, creation (body object) and lookup by id, the
/// lookup requiring a created item.
pub fn items_catalog() -> ActionCatalog {
    ActionCatalog::new(vec![
        Action::rest("GET", "/items").with_param(ParamKind::Query, Gene::optional(Gene::integer_in("limit", 0, 100))),
        Action::rest("POST", "/items")
            .with_param(
                ParamKind::Body,
                Gene::object("body", vec![Gene::string("name", 1, 12), Gene::integer_in("qty", -1000, 1000)]),
            )
            .producing("item"),
        Action::rest("GET", "/items/{id}")
            .with_param(ParamKind::Path, Gene::integer_in("id", 0, 1000))
            .requiring("item"),
    ])
    .unwrap_or_default()
}

/// Covers `call:<action>` for every executed main action, and scores
/// `eq42:<action>::<param>` by how close each integer leaf is to 42.
pub fn score_by_action_names(individual: &Individual, fitness: &mut FitnessValue) {
    for (i, action) in individual.main_actions.iter().enumerate() {
        fitness.update_target(format!("call:{}", action.name), 1.0, Some(i));
        for param in &action.params {
            for (_, gene) in param.gene.flat_view() {
                if let Some(value) = gene.to_json().as_i64().filter(|_| gene.is_leaf()) {
                    fitness.update_target(
                        format!("eq42:{}::{}", action.name, gene.name()),
                        equality_heuristic(value as f64, 42.0),
                        Some(i),
                    );
                }
            }
        }
    }
}

/// Evaluates in-process with a scoring closure; every action "succeeds"
/// with status 200. Keeps the fingerprint of everything it evaluated.
pub struct StubFitness<S> {
    scorer: S,
    evaluations: u64,
    history: Vec<String>,
}

impl<S> StubFitness<S>
where
    S: Fn(&Individual, &mut FitnessValue) + Send,
{
    pub fn new(scorer: S) -> Self {
        Self {
            scorer,
            evaluations: 0,
            history: Vec::new(),
        }
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Fingerprints of the evaluated individuals, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

impl StubFitness<Scorer> {
    pub fn by_action_names() -> Self {
        Self::new(score_by_action_names)
    }
}

#[async_trait]
impl<S> FitnessFunction for StubFitness<S>
where
    S: Fn(&Individual, &mut FitnessValue) + Send,
{
    async fn evaluate(&mut self, individual: &Individual) -> Result<EvaluatedIndividual, SearchError> {
        let mut fitness = FitnessValue::new(individual.size());
        (self.scorer)(individual, &mut fitness);
        self.evaluations += 1;
        self.history.push(individual.fingerprint());
        let results = (0..individual.size())
            .map(|i| ActionResult::executed(i, Some(200)))
            .collect();
        Ok(EvaluatedIndividual::new(individual.clone(), fitness, results))
    }
}

/// Scores like [`score_by_action_names`] for a number of evaluations, then
/// loses the connection.
pub struct FailingFitness {
    remaining: u64,
}

impl FailingFitness {
    pub fn after(successful_evaluations: u64) -> Self {
        Self {
            remaining: successful_evaluations,
        }
    }
}

#[async_trait]
impl FitnessFunction for FailingFitness {
    async fn evaluate(&mut self, individual: &Individual) -> Result<EvaluatedIndividual, SearchError> {
        if self.remaining == 0 {
            return Err(SearchError::ConnectionLost("controller stopped answering".to_string()));
        }
        self.remaining -= 1;
        let mut fitness = FitnessValue::new(individual.size());
        score_by_action_names(individual, &mut fitness);
        let results = (0..individual.size())
            .map(|i| ActionResult::executed(i, Some(200)))
            .collect();
        Ok(EvaluatedIndividual::new(individual.clone(), fitness, results))
    }
}
