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

//! Fitness evaluation against a remote system under test.
//!
//! Each evaluation resets the system, runs the environment actions, then
//! the main actions one at a time (registering each with the controller so
//! heuristics are attributed to it), and finally fetches the heuristics of
//! every target reached.

use crate::controller::RemoteController;
use crate::dto::{ActionDto, ProblemType, TestResultsDto};
use crate::errors::RemoteError;
use crate::executor::{controller_action, ActionExecutor, ControllerExecutor, GraphQlExecutor, RestExecutor};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use strand_core::{
    ActionResult, ActionStatus, EvaluatedIndividual, FitnessFunction, FitnessValue, Individual, SearchConfig,
    SearchError,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_GRAPHQL_ENDPOINT: &str = "/graphql";

/// Extra time given to the HTTP client past the action timeout, so a slow
/// action is reported as timed out rather than as a transport failure.
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

pub struct RemoteFitnessFunction {
    controller: Arc<dyn RemoteController>,
    executor: Box<dyn ActionExecutor>,
    action_timeout: Duration,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
}

impl RemoteFitnessFunction {
    pub fn new(controller: Arc<dyn RemoteController>, executor: Box<dyn ActionExecutor>, config: &SearchConfig) -> Self {
        Self {
            controller,
            executor,
            action_timeout: config.action_timeout(),
            max_consecutive_failures: config.max_consecutive_controller_failures.max(1),
            consecutive_failures: 0,
        }
    }

    /// Starts the system under test and a new search on the controller, and
    /// picks the executor matching the problem type it reports.
    pub async fn connect(controller: Arc<dyn RemoteController>, config: &SearchConfig) -> Result<Self, RemoteError> {
        let info = controller.get_sut_info().await?;
        controller.start_sut().await?;
        controller.start_new_search().await?;

        let client = reqwest::Client::builder()
            .timeout(config.action_timeout() + CLIENT_TIMEOUT_MARGIN)
            .build()?;
        let base_url = info.base_url_of_sut.clone().unwrap_or_default();
        let executor: Box<dyn ActionExecutor> = match info.problem_type {
            Some(ProblemType::Rest) => Box::new(RestExecutor::new(client, &base_url)?),
            Some(ProblemType::Graphql) => {
                let path = info.graphql_endpoint.as_deref().unwrap_or(DEFAULT_GRAPHQL_ENDPOINT);
                let endpoint = format!("{}{}", base_url.trim_end_matches('/'), path);
                Box::new(GraphQlExecutor::new(client, &endpoint)?)
            }
            Some(ProblemType::Rpc) | None => Box::new(ControllerExecutor::new(Arc::clone(&controller))),
        };
        info!("Connected to SUT at {:?} ({:?})", info.base_url_of_sut, info.problem_type);
        Ok(Self::new(controller, executor, config))
    }

    /// Stops the system under test.
    pub async fn close(&self) -> Result<(), RemoteError> {
        self.controller.stop_sut().await
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Bookkeeping of controller calls: a lost connection, or too many
    /// failures in a row, is fatal.
    fn track<T>(&mut self, step: &str, result: Result<T, RemoteError>) -> Result<T, SearchError> {
        match result {
            Ok(value) => {
                self.consecutive_failures = 0;
                Ok(value)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Controller call {} failed ({} in a row): {}",
                    step, self.consecutive_failures, e
                );
                if matches!(e, RemoteError::Unreachable { .. })
                    || self.consecutive_failures >= self.max_consecutive_failures
                {
                    Err(SearchError::ConnectionLost(format!(
                        "{} failed {} times in a row: {}",
                        step, self.consecutive_failures, e
                    )))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn run_main_actions(&mut self, individual: &Individual) -> Result<Vec<ActionResult>, SearchError> {
        let mut results = Vec::with_capacity(individual.size());
        for (index, action) in individual.main_actions.iter().enumerate() {
            let registration = ActionDto {
                index,
                name: Some(action.name.clone()),
                parameters: None,
            };
            let registered = self.controller.register_new_action(&registration).await;
            self.track("newAction", registered)?;

            let outcome = tokio::time::timeout(self.action_timeout, self.executor.execute(action, index)).await;
            // Only calls that never completed cut the test short.
            let (result, truncate) = match outcome {
                Ok(Ok(outcome)) => {
                    let status = if outcome.is_failure() {
                        ActionStatus::Failed
                    } else {
                        ActionStatus::Executed
                    };
                    let result = ActionResult {
                        index,
                        status,
                        status_code: outcome.status_code,
                        message: outcome.failure,
                    };
                    (result, false)
                }
                Ok(Err(e)) if !e.is_timeout() => {
                    let result = ActionResult {
                        index,
                        status: ActionStatus::Failed,
                        status_code: None,
                        message: Some(e.to_string()),
                    };
                    (result, true)
                }
                Ok(Err(_)) | Err(_) => {
                    let result = ActionResult {
                        index,
                        status: ActionStatus::TimedOut,
                        status_code: None,
                        message: Some(RemoteError::Timeout(self.action_timeout.as_millis() as u64).to_string()),
                    };
                    (result, true)
                }
            };

            results.push(result);
            if truncate {
                warn!("{} did not complete, skipping the rest of the test", action.name);
                break;
            }
        }
        for index in results.len()..individual.size() {
            results.push(ActionResult::not_executed(index));
        }
        Ok(results)
    }

    async fn run_env_actions(&mut self, individual: &Individual) -> Result<(), SearchError> {
        for (index, action) in individual.env_actions.iter().enumerate() {
            let response = self.controller.execute_action(&controller_action(action, index)).await;
            let response = self.track("newAction", response)?;
            if let Some(error) = response.error {
                debug!("Environment action {} failed: {}", action.name, error);
            }
        }
        Ok(())
    }
}

/// Heuristics as reported by the controller, keyed by descriptive id when
/// one is given.
pub fn fitness_from_results(results: &TestResultsDto, size: usize) -> FitnessValue {
    let mut fitness = FitnessValue::new(size);
    for target in &results.targets {
        let id = target
            .descriptive_id
            .clone()
            .unwrap_or_else(|| target.id.to_string());
        let action_index = usize::try_from(target.action_index).ok();
        fitness.update_target(id, target.value, action_index);
    }
    for extra in &results.extra_heuristics {
        fitness
            .extra_distances
            .extend(extra.heuristics.iter().map(|h| h.value));
    }
    fitness
}

#[async_trait]
impl FitnessFunction for RemoteFitnessFunction {
    async fn evaluate(&mut self, individual: &Individual) -> Result<EvaluatedIndividual, SearchError> {
        let started = Instant::now();
        let reset = self.controller.reset_sut().await;
        self.track("runSUT", reset)?;

        self.run_env_actions(individual).await?;
        let results = self.run_main_actions(individual).await?;

        let test_results = self.controller.get_test_results(&BTreeSet::new()).await;
        let test_results = self.track("testResults", test_results)?;
        let fitness = fitness_from_results(&test_results, individual.size());

        let mut evaluated = EvaluatedIndividual::new(individual.clone(), fitness, results);
        evaluated.execution_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Evaluated {} actions in {} ms, {} targets reached",
            individual.size(),
            evaluated.execution_time_ms,
            test_results.targets.len()
        );
        Ok(evaluated)
    }
}
