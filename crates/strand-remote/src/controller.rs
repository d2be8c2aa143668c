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

//! Controller protocol: lifecycle of the system under test, action
//! registration and retrieval of target heuristics.

use crate::dto::{
    ActionDto, ActionResponseDto, ControllerInfoDto, SutInfoDto, SutRunDto, TestResultsDto, WrappedResponseDto,
};
use crate::errors::RemoteError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use strand_core::SearchConfig;
use tracing::{debug, warn};
use url::Url;

/// Path under which every controller endpoint lives.
pub const BASE_PATH: &str = "/controller/api";

#[async_trait]
pub trait RemoteController: Send + Sync {
    async fn get_sut_info(&self) -> Result<SutInfoDto, RemoteError>;

    async fn get_controller_info(&self) -> Result<ControllerInfoDto, RemoteError>;

    async fn start_sut(&self) -> Result<(), RemoteError>;

    async fn stop_sut(&self) -> Result<(), RemoteError>;

    /// Brings the system under test back to a clean state and clears the
    /// heuristics collected so far.
    async fn reset_sut(&self) -> Result<(), RemoteError>;

    async fn start_new_search(&self) -> Result<(), RemoteError>;

    /// Announces which action is about to run, so that heuristics can be
    /// attributed to it.
    async fn register_new_action(&self, action: &ActionDto) -> Result<(), RemoteError>;

    /// Runs an action inside the controller (RPC calls, SQL insertions).
    async fn execute_action(&self, action: &ActionDto) -> Result<ActionResponseDto, RemoteError>;

    /// Heuristics since the last reset. With an empty `ids` every target
    /// seen is returned.
    async fn get_test_results(&self, ids: &BTreeSet<i32>) -> Result<TestResultsDto, RemoteError>;
}

/// Talks to a controller over HTTP+JSON.
pub struct HttpRemoteController {
    client: Client,
    base_url: Url,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl HttpRemoteController {
    /// `address` is the controller root, e.g. `http://localhost:40100`.
    pub fn new(address: &str, config: &SearchConfig) -> Result<Self, RemoteError> {
        let base_url = Url::parse(&format!("{}{}/", address.trim_end_matches('/'), BASE_PATH))?;
        let client = Client::builder()
            .timeout(config.action_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url,
            retry_attempts: config.controller_retry_attempts.max(1),
            retry_backoff: Duration::from_millis(config.controller_retry_backoff_ms),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        Ok(self.base_url.join(path)?)
    }

    /// Sends a request, retrying connection faults with a linear backoff.
    async fn call<T, F>(&self, name: &str, build: F) -> Result<Option<T>, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.retry_attempts {
            match build(&self.client).send().await {
                Ok(resp) => return Self::unwrap_response(name, resp).await,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(
                        "Controller call {} failed (attempt {}/{}): {}",
                        name, attempt, self.retry_attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RemoteError::Unreachable {
            attempts: self.retry_attempts,
            reason: last_error,
        })
    }

    async fn unwrap_response<T: DeserializeOwned>(
        name: &str,
        resp: reqwest::Response,
    ) -> Result<Option<T>, RemoteError> {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let wrapped: Option<WrappedResponseDto<T>> = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text)?)
        };

        if let Some(error) = wrapped.as_ref().and_then(|w| w.error.as_ref()) {
            return Err(RemoteError::ControllerError(format!("{}: {}", name, error)));
        }
        if !status.is_success() {
            return Err(RemoteError::ControllerError(format!("{} returned {}: {}", name, status, text)));
        }
        debug!("Controller call {} returned {}", name, status);
        Ok(wrapped.and_then(|w| w.data))
    }

    async fn change_state(&self, run: bool, reset: bool) -> Result<(), RemoteError> {
        let url = self.endpoint("runSUT")?;
        let body = SutRunDto {
            run,
            reset_state: reset,
            calculate_sql_heuristics: false,
        };
        self.call::<Value, _>("runSUT", |c| c.put(url.clone()).json(&body)).await?;
        Ok(())
    }

    fn required<T>(name: &str, data: Option<T>) -> Result<T, RemoteError> {
        data.ok_or_else(|| RemoteError::ControllerError(format!("{}: response carries no data", name)))
    }
}

#[async_trait]
impl RemoteController for HttpRemoteController {
    async fn get_sut_info(&self) -> Result<SutInfoDto, RemoteError> {
        let url = self.endpoint("infoSUT")?;
        let data = self.call("infoSUT", |c| c.get(url.clone())).await?;
        Self::required("infoSUT", data)
    }

    async fn get_controller_info(&self) -> Result<ControllerInfoDto, RemoteError> {
        let url = self.endpoint("controllerInfo")?;
        let data = self.call("controllerInfo", |c| c.get(url.clone())).await?;
        Self::required("controllerInfo", data)
    }

    async fn start_sut(&self) -> Result<(), RemoteError> {
        self.change_state(true, true).await
    }

    async fn stop_sut(&self) -> Result<(), RemoteError> {
        self.change_state(false, false).await
    }

    async fn reset_sut(&self) -> Result<(), RemoteError> {
        self.change_state(true, true).await
    }

    async fn start_new_search(&self) -> Result<(), RemoteError> {
        let url = self.endpoint("newSearch")?;
        self.call::<Value, _>("newSearch", |c| c.post(url.clone()).json(&json!({ "newSearch": true })))
            .await?;
        Ok(())
    }

    async fn register_new_action(&self, action: &ActionDto) -> Result<(), RemoteError> {
        let url = self.endpoint("newAction")?;
        self.call::<Value, _>("newAction", |c| c.put(url.clone()).json(action)).await?;
        Ok(())
    }

    async fn execute_action(&self, action: &ActionDto) -> Result<ActionResponseDto, RemoteError> {
        let url = self.endpoint("newAction")?;
        let data = self.call("newAction", |c| c.put(url.clone()).json(action)).await?;
        Self::required("newAction", data)
    }

    async fn get_test_results(&self, ids: &BTreeSet<i32>) -> Result<TestResultsDto, RemoteError> {
        let mut url = self.endpoint("testResults")?;
        let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        url.query_pairs_mut()
            .append_pair("ids", &joined)
            .append_pair("killSwitch", "false")
            .append_pair("allCovered", "false");
        let data = self.call("testResults", |c| c.get(url.clone())).await?;
        Self::required("testResults", data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_live_under_base_path() {
        let controller = HttpRemoteController::new("http://localhost:40100/", &SearchConfig::default()).unwrap();
        assert_eq!(
            controller.endpoint("infoSUT").unwrap().as_str(),
            "http://localhost:40100/controller/api/infoSUT"
        );
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let result = HttpRemoteController::new("localhost without scheme", &SearchConfig::default());
        assert!(matches!(result, Err(RemoteError::UrlError(_))));
    }
}
