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

//! Executors turn a phenotype action into a call on the system under test.

use crate::controller::RemoteController;
use crate::dto::ActionDto;
use crate::errors::RemoteError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use strand_core::action::GraphQlOperation;
use strand_core::{Action, ParamKind, Transport};
use tracing::debug;
use url::Url;

/// What came back from the system under test for one action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub status_code: Option<u16>,
    pub body: Option<Value>,
    /// Set when the call completed but the response signals a failure.
    pub failure: Option<String>,
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Runs one main action. An `Err` means the call itself did not complete,
/// which truncates the rest of the test.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action, index: usize) -> Result<ActionOutcome, RemoteError>;
}

/// Named argument values of an action, absent optionals left out.
fn arguments(action: &Action, kinds: &[ParamKind]) -> Map<String, Value> {
    action
        .params
        .iter()
        .filter(|p| kinds.contains(&p.kind))
        .map(|p| (p.name.clone(), p.gene.to_json()))
        .filter(|(_, v)| !v.is_null())
        .collect()
}

pub struct RestExecutor {
    client: Client,
    base_url: Url,
}

impl RestExecutor {
    pub fn new(client: Client, base_url: &str) -> Result<Self, RemoteError> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    /// Base URL followed by the action path, each segment percent-encoded.
    pub fn request_url(&self, action: &Action) -> Result<Url, RemoteError> {
        let segments = action.path_segments().unwrap_or_default();
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::ActionError(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(&segments);
        Ok(url)
    }
}

#[async_trait]
impl ActionExecutor for RestExecutor {
    async fn execute(&self, action: &Action, _index: usize) -> Result<ActionOutcome, RemoteError> {
        let Transport::Rest { method, .. } = &action.transport else {
            return Err(RemoteError::ActionError(format!("{} is not a REST action", action.name)));
        };
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| RemoteError::ActionError(format!("{}: {}", action.name, e)))?;
        let mut url = self.request_url(action)?;

        let query = arguments(action, &[ParamKind::Query]);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &query {
                pairs.append_pair(name, &printable(value));
            }
        }

        let mut request = self.client.request(method, url);
        for (name, value) in arguments(action, &[ParamKind::Header]) {
            request = request.header(name.as_str(), printable(&value));
        }
        let body = action.params.iter().find(|p| p.kind == ParamKind::Body);
        let form = arguments(action, &[ParamKind::Form]);
        if let Some(body) = body {
            request = request.json(&body.gene.to_json());
        } else if !form.is_empty() {
            let pairs: Vec<(String, String)> = form.iter().map(|(k, v)| (k.clone(), printable(v))).collect();
            request = request.form(&pairs);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        debug!("{} answered {}", action.name, status);
        Ok(ActionOutcome {
            status_code: Some(status.as_u16()),
            body: serde_json::from_str(&text).ok(),
            failure: status
                .is_server_error()
                .then(|| format!("{} answered {}", action.name, status)),
        })
    }
}

pub struct GraphQlExecutor {
    client: Client,
    endpoint: Url,
}

impl GraphQlExecutor {
    pub fn new(client: Client, endpoint: &str) -> Result<Self, RemoteError> {
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }
}

/// Builds `query { field(a: 1, b: "x") }` with inline argument literals.
pub fn graphql_document(action: &Action) -> Result<String, RemoteError> {
    let Transport::GraphQl { operation, field } = &action.transport else {
        return Err(RemoteError::ActionError(format!("{} is not a GraphQL action", action.name)));
    };
    let keyword = match operation {
        GraphQlOperation::Query => "query",
        GraphQlOperation::Mutation => "mutation",
    };
    let args = arguments(action, &[ParamKind::GraphQlArgument]);
    if args.is_empty() {
        return Ok(format!("{} {{ {} }}", keyword, field));
    }
    let rendered = args
        .iter()
        .map(|(name, value)| format!("{}: {}", name, graphql_literal(value)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("{} {{ {}({}) }}", keyword, field, rendered))
}

fn graphql_literal(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("[{}]", items.iter().map(graphql_literal).collect::<Vec<_>>().join(", ")),
        Value::Object(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(k, v)| format!("{}: {}", k, graphql_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => other.to_string(),
    }
}

fn printable(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ActionExecutor for GraphQlExecutor {
    async fn execute(&self, action: &Action, _index: usize) -> Result<ActionOutcome, RemoteError> {
        let body = json!({ "query": graphql_document(action)?, "variables": {} });
        let resp = self.client.post(self.endpoint.clone()).json(&body).send().await?;
        let status = resp.status();
        let payload: Value = resp.json().await.unwrap_or(Value::Null);
        let failure = match payload.get("errors") {
            Some(Value::Array(errors)) if !errors.is_empty() => Some(format!("{} returned {} errors", action.name, errors.len())),
            _ if status.is_server_error() => Some(format!("{} answered {}", action.name, status)),
            _ => None,
        };
        Ok(ActionOutcome {
            status_code: Some(status.as_u16()),
            body: Some(payload),
            failure,
        })
    }
}

/// Delegates execution to the controller, which runs the call in-process
/// (RPC interfaces) or against the database (SQL insertions).
pub struct ControllerExecutor {
    controller: Arc<dyn RemoteController>,
}

impl ControllerExecutor {
    pub fn new(controller: Arc<dyn RemoteController>) -> Self {
        Self { controller }
    }
}

/// Wire form of an action run by the controller.
pub fn controller_action(action: &Action, index: usize) -> ActionDto {
    let kinds = [ParamKind::RpcArgument, ParamKind::SqlColumn, ParamKind::Body];
    ActionDto {
        index,
        name: Some(action.name.clone()),
        parameters: Some(Value::Object(arguments(action, &kinds))),
    }
}

#[async_trait]
impl ActionExecutor for ControllerExecutor {
    async fn execute(&self, action: &Action, index: usize) -> Result<ActionOutcome, RemoteError> {
        let response = self.controller.execute_action(&controller_action(action, index)).await?;
        Ok(ActionOutcome {
            status_code: response.status_code,
            body: response.response,
            failure: response.error,
        })
    }
}
